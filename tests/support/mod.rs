#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chatbot_client::api::DataBackend;
use chatbot_client::api::events::Subscription;
use chatbot_client::api::models::{
    Conversation, ConversationId, Message, MessageId, MessageReceipt, ReplyAck, Sender,
};
use chatbot_client::error::{BackendError, BackendResult};
use chatbot_client::state::{SendPhase, SharedState};
use chrono::{TimeZone, Utc};
use tokio::sync::{Notify, mpsc};

pub const NEW_CONVERSATION: &str = "c-new";
pub const STORED_MESSAGE: &str = "m-stored";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateConversation { title: String },
    CreateMessage { conversation: String, content: String, reply_pending: bool },
    DeleteMessage { id: String, reply_pending: bool },
    TriggerReply { conversation: String, step: String, context: String, reply_pending: bool },
    SubscribeConversations,
    SubscribeMessages { conversation: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trigger {
    #[default]
    Ack,
    Nack,
    Fail,
    /// Never answers.
    Hang,
    /// Answers once `release` is called.
    Gated,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Script {
    pub fail_create_conversation: bool,
    pub fail_create_message: bool,
    pub hang_create_message: bool,
    pub trigger: Trigger,
    pub fail_delete: bool,
}

fn refused(operation: &'static str) -> BackendError {
    BackendError::GraphQl {
        operation,
        message: "scripted failure".into(),
    }
}

/// In-memory backend that records every call and replays a script.
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    script: Mutex<Script>,
    observed: OnceLock<SharedState>,
    gate: Notify,
    rows: Mutex<Vec<Message>>,
    phases: Mutex<Vec<SendPhase>>,
    conversation_feeds: Mutex<Vec<mpsc::Sender<BackendResult<Vec<Conversation>>>>>,
    message_feeds: Mutex<Vec<(ConversationId, mpsc::Sender<BackendResult<Vec<Message>>>)>>,
}

impl FakeBackend {
    pub fn scripted(script: Script) -> Arc<Self> {
        let backend = Self::default();
        *backend.script.lock().unwrap() = script;
        Arc::new(backend)
    }

    /// Lets the fake note the reply indicator at each call.
    pub fn observe(&self, state: &SharedState) {
        let _ = self.observed.set(state.clone());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::SubscribeConversations | Call::SubscribeMessages { .. }))
            .collect()
    }

    /// Stores a message row as if it had been written earlier.
    pub fn seed(&self, row: Message) {
        self.rows.lock().unwrap().push(row);
    }

    /// Ids of the rows currently stored for `conversation`, in insert order.
    pub fn rows_in(&self, conversation: &str) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.conversation_id.as_str() == conversation)
            .map(|row| row.id.to_string())
            .collect()
    }

    pub fn deletes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::DeleteMessage { .. }))
            .count()
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    fn reply_pending(&self) -> bool {
        self.observed.get().is_some_and(|s| s.read(|s| s.reply_pending))
    }

    fn record(&self, call: Call) {
        if !matches!(call, Call::SubscribeConversations | Call::SubscribeMessages { .. }) {
            let phase = self.observed.get().map(|s| s.read(|s| s.phase));
            self.phases.lock().unwrap().extend(phase);
        }
        self.calls.lock().unwrap().push(call);
    }

    /// Send phase seen at each mutation, in call order.
    pub fn phases(&self) -> Vec<SendPhase> {
        self.phases.lock().unwrap().clone()
    }

    fn script(&self) -> Script {
        *self.script.lock().unwrap()
    }

    pub async fn push_conversations(&self, snapshot: Vec<Conversation>) {
        let feeds: Vec<_> = self.conversation_feeds.lock().unwrap().clone();
        for feed in feeds {
            let _ = feed.send(Ok(snapshot.clone())).await;
        }
    }

    /// Ends every open conversation feed the way the backend does when it
    /// drops the socket.
    pub async fn close_conversations(&self) {
        let feeds: Vec<_> = std::mem::take(&mut *self.conversation_feeds.lock().unwrap());
        for feed in feeds {
            let _ = feed
                .send(Err(BackendError::SubscriptionClosed {
                    operation: "conversations",
                }))
                .await;
        }
    }

    pub async fn close_messages(&self, conversation: &ConversationId) {
        let feeds: Vec<_> = {
            let mut all = self.message_feeds.lock().unwrap();
            let (closing, open) = std::mem::take(&mut *all)
                .into_iter()
                .partition(|(id, _)| id == conversation);
            *all = open;
            closing
        };
        for (_, feed) in feeds {
            let _ = feed
                .send(Err(BackendError::SubscriptionClosed { operation: "messages" }))
                .await;
        }
    }

    /// Pushes to every open feed of `conversation`; closed feeds are skipped.
    pub async fn push_messages(&self, conversation: &ConversationId, snapshot: Vec<Message>) {
        let feeds: Vec<_> = self
            .message_feeds
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == conversation)
            .map(|(_, tx)| tx.clone())
            .collect();
        for feed in feeds {
            let _ = feed.send(Ok(snapshot.clone())).await;
        }
    }
}

impl DataBackend for FakeBackend {
    async fn create_conversation(&self, title: &str) -> BackendResult<Conversation> {
        self.record(Call::CreateConversation { title: title.into() });
        if self.script().fail_create_conversation {
            return Err(refused("createConversation"));
        }
        Ok(conversation(NEW_CONVERSATION, title))
    }

    async fn create_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        sender: Sender,
    ) -> BackendResult<MessageReceipt> {
        self.record(Call::CreateMessage {
            conversation: conversation_id.to_string(),
            content: content.into(),
            reply_pending: self.reply_pending(),
        });
        let script = self.script();
        if script.hang_create_message {
            std::future::pending::<()>().await;
        }
        if script.fail_create_message {
            return Err(refused("createMessage"));
        }
        let row = message(STORED_MESSAGE, conversation_id.as_str(), sender, content);
        self.rows.lock().unwrap().push(row);
        Ok(MessageReceipt {
            id: MessageId::new(STORED_MESSAGE),
        })
    }

    async fn delete_message(&self, id: &MessageId) -> BackendResult<MessageReceipt> {
        self.record(Call::DeleteMessage {
            id: id.to_string(),
            reply_pending: self.reply_pending(),
        });
        if self.script().fail_delete {
            return Err(refused("deleteMessage"));
        }
        let mut rows = self.rows.lock().unwrap();
        let Some(index) = rows.iter().position(|row| &row.id == id) else {
            return Err(BackendError::MissingData {
                operation: "deleteMessage",
            });
        };
        rows.remove(index);
        Ok(MessageReceipt { id: id.clone() })
    }

    async fn trigger_reply(
        &self,
        conversation_id: &ConversationId,
        step: &str,
        context: &str,
    ) -> BackendResult<ReplyAck> {
        self.record(Call::TriggerReply {
            conversation: conversation_id.to_string(),
            step: step.into(),
            context: context.into(),
            reply_pending: self.reply_pending(),
        });
        match self.script().trigger {
            Trigger::Ack => Ok(ReplyAck { success: true }),
            Trigger::Nack => Ok(ReplyAck { success: false }),
            Trigger::Fail => Err(refused("triggerReply")),
            Trigger::Hang => std::future::pending().await,
            Trigger::Gated => {
                self.gate.notified().await;
                Ok(ReplyAck { success: true })
            }
        }
    }

    async fn subscribe_conversations(&self) -> BackendResult<Subscription<Vec<Conversation>>> {
        self.record(Call::SubscribeConversations);
        let (tx, rx) = mpsc::channel(8);
        self.conversation_feeds.lock().unwrap().push(tx);
        Ok(Subscription::from_channel(rx))
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> BackendResult<Subscription<Vec<Message>>> {
        self.record(Call::SubscribeMessages {
            conversation: conversation_id.to_string(),
        });
        let (tx, rx) = mpsc::channel(8);
        self.message_feeds.lock().unwrap().push((conversation_id.clone(), tx));
        Ok(Subscription::from_channel(rx))
    }
}

pub fn conversation(id: &str, title: &str) -> Conversation {
    Conversation {
        id: ConversationId::new(id),
        title: title.into(),
        updated_at: None,
    }
}

pub fn message(id: &str, conversation: &str, sender: Sender, content: &str) -> Message {
    Message {
        id: MessageId::new(id),
        conversation_id: ConversationId::new(conversation),
        sender,
        content: content.into(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
    }
}

/// Polls `condition` until it holds, failing the test after a second.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let wait = async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(1), wait).await.is_err() {
        panic!("timed out waiting for {what}");
    }
}

pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), fut)
        .await
        .expect("future did not finish in time")
}
