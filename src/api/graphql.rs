use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::models::{Conversation, Message, MessageReceipt, ReplyAck};
use crate::error::{BackendError, BackendResult};

pub const CREATE_CONVERSATION: &str = r#"mutation CreateChat($title: String!) {
  insert_chats_one(object: { title: $title }) {
    id
    title
  }
}"#;

pub const CREATE_MESSAGE: &str = r#"mutation InsertUserMessage($chat_id: uuid!, $content: String!, $sender: String!) {
  insert_messages_one(object: { chat_id: $chat_id, content: $content, sender: $sender }) {
    id
  }
}"#;

pub const DELETE_MESSAGE: &str = r#"mutation DeleteMessage($id: uuid!) {
  delete_messages_by_pk(id: $id) {
    id
  }
}"#;

pub const TRIGGER_REPLY: &str = r#"mutation InitiateAction($chat_id: uuid!, $step: String!, $context: String!) {
  getBotReply(chat_id: $chat_id, step: $step, context: $context) {
    Success
  }
}"#;

pub const CONVERSATIONS_SUBSCRIPTION: &str = r#"subscription GetUserChats {
  chats(order_by: { updated_at: desc }) {
    id
    title
    updated_at
  }
}"#;

pub const MESSAGES_SUBSCRIPTION: &str = r#"subscription GetChatMessages($chat_id: uuid!) {
  messages(where: { chat_id: { _eq: $chat_id } }, order_by: { created_at: asc }) {
    id
    chat_id
    content
    sender
    created_at
  }
}"#;

#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: Value,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

impl<T> GraphQlResponse<T> {
    /// Errors win over partial data: a mutation that reports an error did
    /// not happen as far as the caller is concerned.
    pub fn into_data(self, operation: &'static str) -> BackendResult<T> {
        if !self.errors.is_empty() {
            let message = self
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BackendError::GraphQl { operation, message });
        }
        self.data.ok_or(BackendError::MissingData { operation })
    }
}

#[derive(Debug, Deserialize)]
pub struct InsertChatsOne {
    pub insert_chats_one: Option<Conversation>,
}

#[derive(Debug, Deserialize)]
pub struct InsertMessagesOne {
    pub insert_messages_one: Option<MessageReceipt>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessagesByPk {
    pub delete_messages_by_pk: Option<MessageReceipt>,
}

#[derive(Debug, Deserialize)]
pub struct GetBotReply {
    #[serde(rename = "getBotReply")]
    pub get_bot_reply: Option<ReplyAck>,
}

#[derive(Debug, Deserialize)]
pub struct ChatsSnapshot {
    pub chats: Vec<Conversation>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesSnapshot {
    pub messages: Vec<Message>,
}
