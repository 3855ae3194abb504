use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("BMC returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// 401 with no way to rotate credentials. Surfaced to the caller, never contained.
    #[error("Unauthorized (no credential rotation available): {0}")]
    Unauthorized(String),

    /// 401 that persisted after a fresh credential read.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Secret backend error: {0}")]
    SecretBackend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("HTTP server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a failed fetch is treated by the scrape state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Transient,
    Authentication,
    NotFound,
    Decode,
}

impl ExporterError {
    pub fn classify(&self) -> ScrapeOutcome {
        match self {
            ExporterError::Auth(_) | ExporterError::Unauthorized(_) => {
                ScrapeOutcome::Authentication
            }
            ExporterError::NotFound(_) => ScrapeOutcome::NotFound,
            ExporterError::Json(_) | ExporterError::Decode(_) => ScrapeOutcome::Decode,
            _ => ScrapeOutcome::Transient,
        }
    }

    /// True only for a 401 that credential rotation could not fix.
    pub fn is_conclusive_auth(&self) -> bool {
        matches!(self, ExporterError::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
