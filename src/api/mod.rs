pub mod auth;
pub mod client;
pub mod events;
pub mod graphql;
pub mod models;

use crate::error::BackendResult;
use events::Subscription;
use models::{Conversation, ConversationId, Message, MessageId, MessageReceipt, ReplyAck, Sender};

/// The storage and fan-out collaborator: four mutations and two live queries.
///
/// Subscriptions deliver complete, already ordered snapshots; consumers
/// replace what they show with each push instead of merging it.
pub trait DataBackend: Send + Sync + 'static {
    fn create_conversation(&self, title: &str) -> impl Future<Output = BackendResult<Conversation>> + Send;

    fn create_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        sender: Sender,
    ) -> impl Future<Output = BackendResult<MessageReceipt>> + Send;

    fn delete_message(&self, id: &MessageId) -> impl Future<Output = BackendResult<MessageReceipt>> + Send;

    /// Asks the backend to generate a reply. The reply itself lands as a new
    /// assistant row on the message subscription, never in this return value.
    fn trigger_reply(
        &self,
        conversation_id: &ConversationId,
        step: &str,
        context: &str,
    ) -> impl Future<Output = BackendResult<ReplyAck>> + Send;

    /// Conversations of the signed-in user, most recently updated first.
    fn subscribe_conversations(&self) -> impl Future<Output = BackendResult<Subscription<Vec<Conversation>>>> + Send;

    /// Messages of one conversation, oldest first.
    fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = BackendResult<Subscription<Vec<Message>>>> + Send;
}
