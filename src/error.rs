use std::time::Duration;

use thiserror::Error;

use crate::api::models::MessageId;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{operation} request failed: {source}")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} returned HTTP {status}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("{operation} rejected by backend: {message}")]
    GraphQl {
        operation: &'static str,
        message: String,
    },
    #[error("{operation} returned no data")]
    MissingData { operation: &'static str },
    #[error("failed to decode {operation} payload: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("websocket error during {operation}: {source}")]
    WebSocket {
        operation: &'static str,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("subscription {operation} was closed by the backend")]
    SubscriptionClosed { operation: &'static str },
    #[error("{operation} timed out after {after:?}")]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
    #[error("{operation} was not acknowledged by the backend")]
    NotAcknowledged { operation: &'static str },
    #[error("{operation} refused: {message}")]
    Auth {
        operation: &'static str,
        message: String,
    },
    #[error("no signed-in session")]
    Unauthenticated,
}

impl BackendError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::TimedOut { .. })
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Failures of one `submit`. The view only ever sees a generic notice;
/// the precise kind is logged and handed back to the caller.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("could not create conversation: {0}")]
    CreateConversationFailed(#[source] BackendError),
    #[error("could not store message: {0}")]
    CreateMessageFailed(#[source] BackendError),
    #[error("could not trigger reply: {0}")]
    TriggerReplyFailed(#[source] BackendError),
    #[error("could not retract message {message_id} after reply trigger failed ({trigger}): {source}")]
    RollbackFailed {
        message_id: MessageId,
        trigger: String,
        #[source]
        source: BackendError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config directory available on this platform")]
    NoConfigDir,
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse legacy settings {path}: {source}")]
    Legacy {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("{0} is not configured; set it or provide subdomain and region")]
    MissingEndpoint(&'static str),
    #[error("invalid {field} '{url}': {source}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
