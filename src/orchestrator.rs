//! The send sequence: ensure a conversation, persist the user message,
//! trigger the reply, and retract the message if the trigger fails.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::api::DataBackend;
use crate::api::models::{ConversationId, MessageId, Sender};
use crate::error::{BackendError, SendError};
use crate::state::{ActiveConversation, SendPhase, Settlement, SharedState};
use crate::stream::MessageStream;
use crate::utils::with_timeout;

/// Step marker passed to the reply action for a user-authored turn.
pub const REPLY_STEP: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Mutations and subscription handshakes.
    pub request: Duration,
    /// The reply trigger, which blocks while the backend generates.
    pub reply: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            reply: Duration::from_secs(120),
        }
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Empty input or a send already in flight; nothing happened.
    Ignored,
    Delivered {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// The trigger failed and the user message was retracted.
    RolledBack(SendError),
    Failed(SendError),
}

impl SubmitOutcome {
    pub fn settlement(&self) -> Option<Settlement> {
        match self {
            SubmitOutcome::Ignored => None,
            SubmitOutcome::Delivered { .. } => Some(Settlement::Success),
            SubmitOutcome::RolledBack(_) => Some(Settlement::RolledBack),
            SubmitOutcome::Failed(_) => Some(Settlement::Failed),
        }
    }

    /// The failure that gets surfaced, if any.
    pub fn error(&self) -> Option<&SendError> {
        match self {
            SubmitOutcome::RolledBack(err) | SubmitOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

// Settles as failed if the send future is dropped mid-flight, so the lock
// and the indicator can never be left behind.
struct InFlight<'a> {
    state: &'a SharedState,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, settlement: Settlement) {
        self.settled = true;
        self.state.transition(|s| s.settle(settlement));
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("send abandoned mid-flight");
            self.state.transition(|s| s.settle(Settlement::Failed));
        }
    }
}

pub struct SendOrchestrator<B> {
    backend: Arc<B>,
    state: SharedState,
    stream: MessageStream<B>,
    timeouts: Timeouts,
}

impl<B: DataBackend> SendOrchestrator<B> {
    pub fn new(backend: Arc<B>, state: SharedState, stream: MessageStream<B>, timeouts: Timeouts) -> Self {
        Self {
            backend,
            state,
            stream,
            timeouts,
        }
    }

    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let content = text.trim();
        if content.is_empty() {
            debug!("submit ignored: empty input");
            return SubmitOutcome::Ignored;
        }
        let Some(target) = self.state.begin_send() else {
            debug!("submit ignored: a send is already in flight");
            return SubmitOutcome::Ignored;
        };
        let lease = InFlight {
            state: &self.state,
            settled: false,
        };

        let outcome = self.run(content, target).await;
        match &outcome {
            SubmitOutcome::Delivered { conversation_id, .. } => info!("reply requested for {conversation_id}"),
            SubmitOutcome::RolledBack(err) | SubmitOutcome::Failed(err) => error!("send failed: {err}"),
            SubmitOutcome::Ignored => {}
        }
        lease.settle(outcome.settlement().unwrap_or(Settlement::Failed));
        outcome
    }

    async fn run(&self, content: &str, target: ActiveConversation) -> SubmitOutcome {
        let conversation_id = match target {
            ActiveConversation::Selected(id) => id,
            ActiveConversation::NewChat => {
                self.state.transition(|s| s.enter(SendPhase::AwaitingConversationCreate));
                let created = with_timeout(
                    "createConversation",
                    self.timeouts.request,
                    self.backend.create_conversation(content),
                )
                .await;
                match created {
                    Ok(conversation) => {
                        info!("created conversation {}", conversation.id);
                        self.adopt(&conversation.id);
                        conversation.id
                    }
                    Err(err) => return SubmitOutcome::Failed(SendError::CreateConversationFailed(err)),
                }
            }
        };

        // The input box empties before the store call resolves, whatever its outcome.
        self.state.transition(|s| s.clear_input());
        let stored = with_timeout(
            "createMessage",
            self.timeouts.request,
            self.backend.create_message(&conversation_id, content, Sender::User),
        )
        .await;
        let message_id = match stored {
            Ok(receipt) => receipt.id,
            Err(err) => {
                // A conversation created above stays behind; it is not retracted.
                return SubmitOutcome::Failed(SendError::CreateMessageFailed(err));
            }
        };
        self.state.transition(|s| s.enter(SendPhase::MessagePersisted));

        self.state.transition(|s| s.raise_reply_pending());
        let triggered = with_timeout(
            "triggerReply",
            self.timeouts.reply,
            self.backend.trigger_reply(&conversation_id, REPLY_STEP, content),
        )
        .await;
        match triggered {
            Ok(ack) if ack.success => SubmitOutcome::Delivered {
                conversation_id,
                message_id,
            },
            Ok(_) => {
                self.compensate(message_id, BackendError::NotAcknowledged { operation: "triggerReply" })
                    .await
            }
            Err(err) => self.compensate(message_id, err).await,
        }
    }

    /// Retracts the stored user message after a failed trigger.
    async fn compensate(&self, message_id: MessageId, trigger: BackendError) -> SubmitOutcome {
        warn!("reply trigger failed ({trigger}); retracting message {message_id}");
        let deleted = with_timeout(
            "deleteMessage",
            self.timeouts.request,
            self.backend.delete_message(&message_id),
        )
        .await;
        match deleted {
            Ok(_) => SubmitOutcome::RolledBack(SendError::TriggerReplyFailed(trigger)),
            Err(source) => SubmitOutcome::Failed(SendError::RollbackFailed {
                message_id,
                trigger: trigger.to_string(),
                source,
            }),
        }
    }

    fn adopt(&self, id: &ConversationId) {
        if self.state.transition(|s| s.select(id)) {
            self.stream.retarget(&ActiveConversation::Selected(id.clone()));
        }
    }
}
