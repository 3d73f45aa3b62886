use thiserror::Error;

/// Main error type for the monitoring service
#[derive(Error, Debug)]
pub enum VigilError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Session lifecycle errors
    #[error("Invalid session spec: {0}")]
    InvalidSpec(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Registry is not accepting new sessions")]
    NotAccepting,

    // Pipeline errors
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    #[error("Fatal session error: {0}")]
    FatalSession(String),

    #[error("Delivery to sink {sink} failed: {reason}")]
    Delivery { sink: String, reason: String },

    #[error("Checkpoint regression for session {session}: {current} -> {requested}")]
    CheckpointRegression {
        session: String,
        current: u64,
        requested: u64,
    },

    // Startup errors
    #[error("Bootstrap manifest error: {0}")]
    Bootstrap(String),

    #[error("Client bundle error: {0}")]
    ClientBundle(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl VigilError {
    /// Whether a chain-side error is worth retrying with backoff.
    ///
    /// Network failures, timeouts and upstream RPC errors are transient;
    /// everything else (bad data, invariant violations) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            VigilError::TransientFetch(_) | VigilError::Rpc { .. } | VigilError::Database(_) => {
                true
            }
            VigilError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.status().map_or(true, |s| {
                    s.is_server_error() || s.as_u16() == 429
                })
            }
            _ => false,
        }
    }
}

/// Result type alias for VigilError
pub type Result<T> = std::result::Result<T, VigilError>;
