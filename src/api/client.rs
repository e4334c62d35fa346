use std::sync::Arc;
use std::time::Duration;

use log::debug;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::api::auth::AuthClient;
use crate::api::events::{self, Subscription};
use crate::api::graphql::{self, GraphQlRequest, GraphQlResponse};
use crate::api::models::{Conversation, ConversationId, Message, MessageId, MessageReceipt, ReplyAck, Sender};
use crate::api::DataBackend;
use crate::error::{BackendError, BackendResult};
use crate::utils::with_timeout;

/// GraphQL data backend: mutations over HTTP, live queries over websocket.
pub struct ApiClient {
    http: HttpClient,
    graphql_url: Url,
    ws_url: Url,
    auth: Arc<AuthClient>,
    handshake_timeout: Duration,
}

impl ApiClient {
    pub fn new(http: HttpClient, graphql_url: Url, ws_url: Url, auth: Arc<AuthClient>, handshake_timeout: Duration) -> Self {
        Self {
            http,
            graphql_url,
            ws_url,
            auth,
            handshake_timeout,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, operation: &'static str, query: &str, variables: Value) -> BackendResult<T> {
        let token = self.auth.access_token().await?;
        debug!("graphql {operation}");
        let resp = self
            .http
            .post(self.graphql_url.clone())
            .bearer_auth(token)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|source| BackendError::Http { operation, source })?;
        if !resp.status().is_success() {
            return Err(BackendError::Status {
                operation,
                status: resp.status(),
            });
        }
        let body: GraphQlResponse<T> = resp
            .json()
            .await
            .map_err(|source| BackendError::Http { operation, source })?;
        body.into_data(operation)
    }

    async fn live<T: Send + 'static>(
        &self,
        operation: &'static str,
        query: &'static str,
        variables: Value,
        decode: fn(Value) -> serde_json::Result<T>,
    ) -> BackendResult<Subscription<T>> {
        let token = self.auth.access_token().await?;
        with_timeout(
            operation,
            self.handshake_timeout,
            events::subscribe(&self.ws_url, &token, operation, query, variables, decode),
        )
        .await
    }
}

impl DataBackend for ApiClient {
    async fn create_conversation(&self, title: &str) -> BackendResult<Conversation> {
        let data: graphql::InsertChatsOne = self
            .execute("createConversation", graphql::CREATE_CONVERSATION, json!({ "title": title }))
            .await?;
        data.insert_chats_one
            .ok_or(BackendError::MissingData { operation: "createConversation" })
    }

    async fn create_message(&self, conversation_id: &ConversationId, content: &str, sender: Sender) -> BackendResult<MessageReceipt> {
        let data: graphql::InsertMessagesOne = self
            .execute(
                "createMessage",
                graphql::CREATE_MESSAGE,
                json!({ "chat_id": conversation_id, "content": content, "sender": sender }),
            )
            .await?;
        data.insert_messages_one
            .ok_or(BackendError::MissingData { operation: "createMessage" })
    }

    async fn delete_message(&self, id: &MessageId) -> BackendResult<MessageReceipt> {
        let data: graphql::DeleteMessagesByPk = self
            .execute("deleteMessage", graphql::DELETE_MESSAGE, json!({ "id": id }))
            .await?;
        // A null row means nothing matched, so nothing was retracted.
        data.delete_messages_by_pk
            .ok_or(BackendError::MissingData { operation: "deleteMessage" })
    }

    async fn trigger_reply(&self, conversation_id: &ConversationId, step: &str, context: &str) -> BackendResult<ReplyAck> {
        let data: graphql::GetBotReply = self
            .execute(
                "triggerReply",
                graphql::TRIGGER_REPLY,
                json!({ "chat_id": conversation_id, "step": step, "context": context }),
            )
            .await?;
        data.get_bot_reply
            .ok_or(BackendError::MissingData { operation: "triggerReply" })
    }

    async fn subscribe_conversations(&self) -> BackendResult<Subscription<Vec<Conversation>>> {
        self.live("conversations", graphql::CONVERSATIONS_SUBSCRIPTION, json!({}), |data| {
            serde_json::from_value::<graphql::ChatsSnapshot>(data).map(|s| s.chats)
        })
        .await
    }

    async fn subscribe_messages(&self, conversation_id: &ConversationId) -> BackendResult<Subscription<Vec<Message>>> {
        self.live(
            "messages",
            graphql::MESSAGES_SUBSCRIPTION,
            json!({ "chat_id": conversation_id }),
            |data| serde_json::from_value::<graphql::MessagesSnapshot>(data).map(|s| s.messages),
        )
        .await
    }
}
