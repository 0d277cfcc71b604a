use thiserror::Error;

/// Errors surfaced by the turn engine and backend client.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("a turn is already in flight")]
    TurnInFlight,

    #[error("invalid source configuration: {0}")]
    InvalidSource(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("stream failed: {0}")]
    Stream(String),
}
