use thiserror::Error;

/// Main error type for the trade fleet
#[derive(Error, Debug)]
pub enum FleetError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Platform collaborator errors (connect, inventory, chat, crafting)
    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    // Trade session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for FleetError
pub type Result<T> = std::result::Result<T, FleetError>;

/// Failures of a single exchange-session operation.
///
/// Every variant is retryable from the executor's point of view; the
/// distinction only matters for logging and for callers that want to tell a
/// dead session apart from a blip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("transient session failure: {0}")]
    Transient(String),

    #[error("session rejected the operation: {0}")]
    Rejected(String),

    #[error("no active trade session")]
    NoActiveSession,

    #[error("trade session already closed")]
    Closed,
}
