use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("vSphere API error: {0}")]
    Api(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session stale: {0}")]
    SessionStale(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Sampling error: {0}")]
    Sampling(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("HTTP server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExporterError {
    /// True for deadline expiry or explicit cancellation. These mean
    /// "no data this round" and are not reported as failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExporterError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
