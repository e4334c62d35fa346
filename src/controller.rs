use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio::sync::watch;

use crate::api::DataBackend;
use crate::api::models::ConversationId;
use crate::directory;
use crate::orchestrator::{SendOrchestrator, SubmitOutcome, Timeouts};
use crate::state::{ActiveConversation, ChatState, SharedState};
use crate::stream::MessageStream;
use crate::utils::TaskGuard;

/// One open chat session: the state, its two live collections and the
/// send orchestrator, behind named transitions.
pub struct ChatController<B> {
    backend: Arc<B>,
    state: SharedState,
    stream: MessageStream<B>,
    orchestrator: SendOrchestrator<B>,
    directory_feed: Mutex<Option<TaskGuard>>,
}

impl<B: DataBackend> ChatController<B> {
    pub fn new(backend: Arc<B>, timeouts: Timeouts) -> Self {
        let state = SharedState::new();
        let stream = MessageStream::new(backend.clone(), state.clone());
        let orchestrator = SendOrchestrator::new(backend.clone(), state.clone(), stream.clone(), timeouts);
        Self {
            backend,
            state,
            stream,
            orchestrator,
            directory_feed: Mutex::new(None),
        }
    }

    fn directory_feed(&self) -> MutexGuard<'_, Option<TaskGuard>> {
        self.directory_feed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the standing conversation subscription. Calling it again is a no-op.
    pub fn start(&self) {
        let mut feed = self.directory_feed();
        if feed.is_none() {
            *feed = Some(directory::follow(self.backend.clone(), self.state.clone()));
        }
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<ChatState> {
        self.state.watch()
    }

    /// Makes a listed conversation active. Unknown ids are refused so the
    /// active value always names a conversation the backend confirmed.
    pub fn select(&self, id: &ConversationId) -> bool {
        if !self.state.read(|s| s.directory.contains(id)) {
            debug!("refusing to select unlisted conversation {id}");
            return false;
        }
        if self.state.transition(|s| s.select(id)) {
            self.stream.retarget(&ActiveConversation::Selected(id.clone()));
        }
        true
    }

    /// Selects by sidebar position.
    pub fn select_nth(&self, index: usize) -> Option<ConversationId> {
        let id = self.state.read(|s| s.directory.nth(index).map(|c| c.id.clone()))?;
        self.select(&id).then_some(id)
    }

    pub fn start_new_chat(&self) {
        self.state.transition(|s| s.start_new_chat());
        self.stream.retarget(&ActiveConversation::NewChat);
    }

    pub fn set_input(&self, text: &str) {
        self.state.transition(|s| s.set_input(text));
    }

    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        self.orchestrator.submit(text).await
    }

    /// Submits whatever the input buffer holds.
    pub async fn submit_input(&self) -> SubmitOutcome {
        let text = self.state.read(|s| s.input.clone());
        self.submit(&text).await
    }

    pub fn shutdown(&self) {
        self.directory_feed().take();
        self.stream.detach();
    }
}
