use thiserror::Error;

/// Main error type for the screener service
#[derive(Error, Debug)]
pub enum ScanError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Store errors are fatal for the current invocation; the next trigger retries
    #[error("Store unavailable: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Universe errors
    #[error("Universe load error: {0}")]
    Universe(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for ScanError
pub type Result<T> = std::result::Result<T, ScanError>;

/// Per-symbol evaluation failure.
///
/// Absorbed at the batch-stepper level: the symbol's result slot records the
/// error and the batch keeps going. Never escalates to a session failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("no data returned for symbol")]
    NoData,

    #[error("insufficient history: {days} days, need at least {min_days}")]
    InsufficientHistory { days: usize, min_days: usize },

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("evaluation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Notification delivery failure for a single subscriber.
///
/// Recorded and skipped; other subscribers are still attempted.
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("rejected by chat API: {status} - {body}")]
    Rejected { status: u16, body: String },
}
