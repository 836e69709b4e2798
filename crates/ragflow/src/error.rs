//! Error types for the query-processing pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
///
/// The taxonomy separates failures the caller caused (`InputRejected`),
/// failures worth retrying (`Transient`), and failures that must not be
/// retried (`Fatal`). An empty retrieval is not an error and has no variant
/// here; the scorer handles it.
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed validation; terminal for the query, never retried
    #[error("input rejected: {0}")]
    InputRejected(String),

    /// Retryable failure of an external service (timeout, rate limit, 5xx)
    #[error("transient {service} error: {message}")]
    Transient { service: &'static str, message: String },

    /// Non-retryable failure of an external service (auth, malformed input,
    /// dimension or collection mismatch)
    #[error("fatal {service} error: {message}")]
    Fatal { service: &'static str, message: String },

    /// Generator exhausted its retry budget without producing an answer
    #[error("generation failed after {attempts} attempts: {message}")]
    GenerationFailed { attempts: u32, message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Relational store error
    #[error("database error: {0}")]
    Database(String),

    /// Job queue error
    #[error("queue error: {0}")]
    Queue(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a transient service error
    pub fn transient(service: &'static str, message: impl Into<String>) -> Self {
        Self::Transient { service, message: message.into() }
    }

    /// Create a fatal service error
    pub fn fatal(service: &'static str, message: impl Into<String>) -> Self {
        Self::Fatal { service, message: message.into() }
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue(message.into())
    }

    /// Whether this error is worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }

    /// Classify a reqwest failure for the given service.
    ///
    /// Timeouts and connection problems count as transient; request building
    /// and body decoding problems do not.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Transient { service, message: err.to_string() }
        } else {
            Self::Fatal { service, message: err.to_string() }
        }
    }

    /// Classify an HTTP status code returned by an external service
    pub fn from_status(service: &'static str, status: reqwest::StatusCode, body: String) -> Self {
        let message = format!("HTTP {status}: {body}");
        if status.as_u16() == 429 || status.is_server_error() {
            Self::Transient { service, message }
        } else {
            Self::Fatal { service, message }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}
