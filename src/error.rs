//! Error types shared by the interaction core and its adapters.

use teloxide::RequestError;

/// Errors raised while handling an inbound event
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BotError {
    /// Network or connectivity failure talking to the chat platform
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The platform refused a request (file too large, bad format, ...)
    #[error("Platform rejected request: {0}")]
    Rejected(String),

    /// A button token that does not decode to a known action record
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unknown keyboard: {0}")]
    UnknownKeyboard(String),

    /// External highlighter/renderer failed
    #[error("Render failed: {0}")]
    Render(String),

    #[error("Preference store error: {0}")]
    Store(String),

    #[error("Invalid thread transition: {0}")]
    InvalidTransition(String),

    /// The event lacks data the handler needs (e.g. no replied-to snippet)
    #[error("Missing context: {0}")]
    MissingContext(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BotError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Short machine-readable code for log records
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Rejected(_) => "rejected",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::UnknownKeyboard(_) => "unknown_keyboard",
            Self::Render(_) => "render",
            Self::Store(_) => "store",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::MissingContext(_) => "missing_context",
            Self::Config(_) => "config",
        }
    }
}

impl From<RequestError> for BotError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Network(e) => Self::Transport(e.to_string()),
            RequestError::Io(e) => Self::Transport(e.to_string()),
            RequestError::RetryAfter(secs) => {
                Self::Transport(format!("rate limited, retry after {:?}", secs))
            }
            other => Self::Rejected(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for BotError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
