use std::sync::Arc;

use tokio::sync::watch;

use crate::api::models::ConversationId;
use crate::directory::Directory;
use crate::stream::MessageLog;

/// Generic failure text shown to the user; the precise cause only goes to the log.
pub const SEND_FAILED_NOTICE: &str = "Message failed to send. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveConversation {
    /// Nothing selected yet; the next submit creates a conversation.
    #[default]
    NewChat,
    Selected(ConversationId),
}

impl ActiveConversation {
    pub fn id(&self) -> Option<&ConversationId> {
        match self {
            ActiveConversation::NewChat => None,
            ActiveConversation::Selected(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Success,
    /// Reply trigger failed and the user message was retracted.
    RolledBack,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPhase {
    #[default]
    Idle,
    Sending,
    AwaitingConversationCreate,
    MessagePersisted,
    AwaitingReply,
    Settled(Settlement),
}

impl SendPhase {
    pub fn in_flight(self) -> bool {
        !matches!(self, SendPhase::Idle | SendPhase::Settled(_))
    }
}

/// Everything one open chat session shows. Mutated only through the
/// transitions below.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub active: ActiveConversation,
    pub input: String,
    pub directory: Directory,
    pub stream: MessageLog,
    pub phase: SendPhase,
    pub reply_pending: bool,
    /// Bumped once per surfaced send failure.
    pub failures: u64,
    pub notice: Option<&'static str>,
}

impl ChatState {
    pub fn is_sending(&self) -> bool {
        self.phase.in_flight()
    }

    pub fn select(&mut self, id: &ConversationId) -> bool {
        if self.active.id() == Some(id) {
            return false;
        }
        self.active = ActiveConversation::Selected(id.clone());
        self.stream.reset(Some(id.clone()));
        true
    }

    pub fn start_new_chat(&mut self) -> bool {
        self.active = ActiveConversation::NewChat;
        self.stream.reset(None);
        self.input.clear();
        self.reply_pending = false;
        true
    }

    pub fn set_input(&mut self, text: &str) -> bool {
        if self.input == text {
            return false;
        }
        self.input = text.to_string();
        true
    }

    pub fn begin_send(&mut self) -> Option<ActiveConversation> {
        if self.is_sending() {
            return None;
        }
        self.phase = SendPhase::Sending;
        self.notice = None;
        Some(self.active.clone())
    }

    pub fn enter(&mut self, phase: SendPhase) -> bool {
        self.phase = phase;
        true
    }

    pub fn clear_input(&mut self) -> bool {
        self.input.clear();
        true
    }

    pub fn raise_reply_pending(&mut self) -> bool {
        self.phase = SendPhase::AwaitingReply;
        self.reply_pending = true;
        true
    }

    pub fn settle(&mut self, settlement: Settlement) -> bool {
        self.phase = SendPhase::Settled(settlement);
        self.reply_pending = false;
        if settlement != Settlement::Success {
            self.failures += 1;
            self.notice = Some(SEND_FAILED_NOTICE);
        }
        true
    }
}

/// The single state instance of a controller, published to observers on
/// every change.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<watch::Sender<ChatState>>);

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ChatState::default());
        Self(Arc::new(tx))
    }

    pub fn watch(&self) -> watch::Receiver<ChatState> {
        self.0.subscribe()
    }

    pub fn snapshot(&self) -> ChatState {
        self.0.borrow().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        f(&self.0.borrow())
    }

    /// Applies a transition; observers are woken only if it reports a change.
    pub fn transition(&self, f: impl FnOnce(&mut ChatState) -> bool) -> bool {
        self.0.send_if_modified(f)
    }

    /// Takes the in-flight lock, handing back the conversation the send targets.
    pub fn begin_send(&self) -> Option<ActiveConversation> {
        let mut target = None;
        self.0.send_if_modified(|state| {
            target = state.begin_send();
            target.is_some()
        });
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_send_is_exclusive_until_settled() {
        let mut state = ChatState::default();
        assert_eq!(state.begin_send(), Some(ActiveConversation::NewChat));
        assert_eq!(state.begin_send(), None);

        state.raise_reply_pending();
        assert!(state.reply_pending);
        state.settle(Settlement::Success);
        assert!(!state.reply_pending);
        assert_eq!(state.failures, 0);
        assert!(state.begin_send().is_some());
    }

    #[test]
    fn failed_settlement_surfaces_one_generic_notice() {
        let mut state = ChatState::default();
        state.begin_send();
        state.raise_reply_pending();
        state.settle(Settlement::RolledBack);
        assert_eq!(state.phase, SendPhase::Settled(Settlement::RolledBack));
        assert!(!state.reply_pending);
        assert_eq!(state.failures, 1);
        assert_eq!(state.notice, Some(SEND_FAILED_NOTICE));

        state.begin_send();
        assert_eq!(state.notice, None);
    }

    #[test]
    fn selecting_the_active_conversation_is_a_no_op() {
        let mut state = ChatState::default();
        let id = ConversationId::new("c-1");
        assert!(state.select(&id));
        assert!(!state.select(&id));
        assert_eq!(state.stream.conversation(), Some(&id));
    }

    #[test]
    fn new_chat_clears_stream_input_and_indicator() {
        let mut state = ChatState::default();
        state.select(&ConversationId::new("c-1"));
        state.set_input("draft");
        state.reply_pending = true;

        state.start_new_chat();

        assert_eq!(state.active, ActiveConversation::NewChat);
        assert!(state.stream.conversation().is_none());
        assert!(state.stream.messages().is_empty());
        assert!(state.input.is_empty());
        assert!(!state.reply_pending);
    }

    #[tokio::test]
    async fn rejected_begin_send_does_not_wake_observers() {
        let shared = SharedState::new();
        let mut rx = shared.watch();
        assert!(shared.begin_send().is_some());
        assert!(rx.has_changed().expect("sender alive"));
        rx.borrow_and_update();

        assert!(shared.begin_send().is_none());
        assert!(!rx.has_changed().expect("sender alive"));
    }
}
