use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::api::DataBackend;
use crate::api::events;
use crate::api::models::{ConversationId, Message};
use crate::state::{ActiveConversation, SharedState};
use crate::utils::{TaskGuard, spawn_guarded};

/// Messages of the active conversation, oldest first, exactly as last pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    conversation: Option<ConversationId>,
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn conversation(&self) -> Option<&ConversationId> {
        self.conversation.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tears the log down for a new target; it is rebuilt by the next push.
    pub fn reset(&mut self, conversation: Option<ConversationId>) {
        self.conversation = conversation;
        self.messages.clear();
    }

    /// Wholesale replace. Pushes for any other conversation are stale and dropped.
    pub fn replace(&mut self, conversation: &ConversationId, snapshot: Vec<Message>) -> bool {
        if self.conversation.as_ref() != Some(conversation) {
            return false;
        }
        self.messages = snapshot;
        true
    }
}

/// Owns the per-conversation message subscription.
pub struct MessageStream<B> {
    backend: Arc<B>,
    state: SharedState,
    feed: Arc<Mutex<Option<TaskGuard>>>,
}

impl<B> Clone for MessageStream<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            state: self.state.clone(),
            feed: self.feed.clone(),
        }
    }
}

impl<B: DataBackend> MessageStream<B> {
    pub fn new(backend: Arc<B>, state: SharedState) -> Self {
        Self {
            backend,
            state,
            feed: Arc::new(Mutex::new(None)),
        }
    }

    fn feed(&self) -> MutexGuard<'_, Option<TaskGuard>> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the current subscription and, for a real conversation, opens a
    /// fresh one. Does not touch any in-flight send.
    pub fn retarget(&self, active: &ActiveConversation) {
        let next = active.id().map(|id| {
            debug!("opening message subscription for {id}");
            spawn_guarded(pump(self.backend.clone(), self.state.clone(), id.clone()))
        });
        let previous = std::mem::replace(&mut *self.feed(), next);
        drop(previous);
    }

    pub fn is_attached(&self) -> bool {
        self.feed().as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn detach(&self) {
        self.feed().take();
    }
}

async fn pump<B: DataBackend>(backend: Arc<B>, state: SharedState, conversation: ConversationId) {
    events::follow(
        "messages",
        || backend.subscribe_messages(&conversation),
        |snapshot| {
            if !state.transition(|s| s.stream.replace(&conversation, snapshot)) {
                debug!("dropped stale message push for {conversation}");
            }
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::api::models::{MessageId, Sender};

    fn message(id: &str, conversation: &str, content: &str) -> Message {
        Message {
            id: MessageId::new(id),
            conversation_id: ConversationId::new(conversation),
            sender: Sender::User,
            content: content.into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn pushes_for_other_conversations_are_ignored() {
        let mut log = MessageLog::default();
        let active = ConversationId::new("c-2");
        log.reset(Some(active.clone()));

        assert!(!log.replace(&ConversationId::new("c-1"), vec![message("m-1", "c-1", "old")]));
        assert!(log.is_empty());

        assert!(log.replace(&active, vec![message("m-2", "c-2", "new")]));
        assert_eq!(log.messages().len(), 1);
    }

    #[test]
    fn replace_drops_rows_missing_from_the_push() {
        let mut log = MessageLog::default();
        let id = ConversationId::new("c-1");
        log.reset(Some(id.clone()));
        log.replace(&id, vec![message("m-1", "c-1", "a"), message("m-2", "c-1", "b")]);
        log.replace(&id, vec![message("m-1", "c-1", "a")]);

        let ids: Vec<&str> = log.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-1"]);
    }

    #[test]
    fn sentinel_has_no_conversation() {
        let mut log = MessageLog::default();
        log.reset(Some(ConversationId::new("c-1")));
        log.reset(None);
        assert!(log.conversation().is_none());
        assert!(!log.replace(&ConversationId::new("c-1"), Vec::new()));
    }
}
