//! Client for a hosted chatbot backend: session gating, a live conversation
//! directory, a live message stream and a send pipeline that retracts the
//! user's message when the reply cannot be triggered.

pub mod api;
pub mod app;
pub mod controller;
pub mod directory;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod state;
pub mod stream;
pub mod ui;
pub mod utils;

pub use api::DataBackend;
pub use controller::ChatController;
pub use error::{AppError, BackendError, SendError};
pub use orchestrator::{SubmitOutcome, Timeouts};
pub use state::{ActiveConversation, ChatState, SendPhase, Settlement};
