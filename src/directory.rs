use std::sync::Arc;

use crate::api::DataBackend;
use crate::api::events;
use crate::api::models::{Conversation, ConversationId};
use crate::state::SharedState;
use crate::utils::{TaskGuard, spawn_guarded};

/// The signed-in user's conversations, in backend order (most recently
/// updated first).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    conversations: Vec<Conversation>,
}

impl Directory {
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.get(id).is_some()
    }

    pub fn nth(&self, index: usize) -> Option<&Conversation> {
        self.conversations.get(index)
    }

    /// Swaps in a pushed snapshot as-is. No merge, no re-sort.
    pub fn replace(&mut self, snapshot: Vec<Conversation>) -> bool {
        self.conversations = snapshot;
        true
    }
}

/// Keeps `state.directory` mirrored on the conversations subscription for
/// as long as the returned guard lives.
pub fn follow<B: DataBackend>(backend: Arc<B>, state: SharedState) -> TaskGuard {
    spawn_guarded(async move {
        events::follow(
            "conversations",
            || backend.subscribe_conversations(),
            |snapshot| {
                state.transition(|s| s.directory.replace(snapshot));
            },
        )
        .await;
    })
}
