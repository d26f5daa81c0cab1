//! Error types.

use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single transfer's native failure.
///
/// Carries the libcurl error code and message. On the synchronous path this
/// is raised as [`Error::Transport`]; in pooled mode it is routed to the
/// `rejected` hook and never aborts sibling requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error {code}: {message}")]
pub struct TransportError {
    /// Native error code (`CURLcode`), nonzero.
    pub code: i32,
    /// Native error message.
    pub message: String,
}

impl TransportError {
    /// Build a transport error from a raw code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether this error represents a transfer that was never observed to
    /// complete (code 0 sentinel used by the pool's completeness policy).
    pub fn is_incomplete(&self) -> bool {
        self.code == 0
    }
}

impl From<curl::Error> for TransportError {
    fn from(e: curl::Error) -> Self {
        Self {
            code: e.code() as i32,
            message: e.to_string(),
        }
    }
}

/// Failure of the wait/poll mechanism itself, as opposed to any single
/// transfer. Routed to the `runtime_rejected` hook; escalates to a pool-wide
/// abort only by explicit caller policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("multiplexer error {code}: {message}")]
pub struct MultiplexerError {
    /// Native error code (`CURLMcode`).
    pub code: i32,
    /// Native error message.
    pub message: String,
}

impl MultiplexerError {
    /// Build a multiplexer error from a raw code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<curl::MultiError> for MultiplexerError {
    fn from(e: curl::MultiError) -> Self {
        Self {
            code: e.code() as i32,
            message: e.to_string(),
        }
    }
}

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid option or descriptor, detected while building a request or
    /// configuring a session. Surfaced immediately, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// A single transfer failed at the transport level.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The multiplexer's wait/poll mechanism failed.
    #[error(transparent)]
    Multiplexer(#[from] MultiplexerError),

    /// A completed response carried a failed (4xx/5xx) status.
    ///
    /// Produced by [`Response::error_for_status`](crate::Response::error_for_status).
    #[error("{}", status_message(*.status, .body))]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Invalid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// I/O error opening or reading an attachment or upload file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_message(status: u16, body: &str) -> String {
    if body.is_empty() {
        format!("HTTP request returned status code {status}")
    } else {
        format!("HTTP request returned status code {status}: {body}")
    }
}

impl Error {
    /// Get the HTTP status code if this is a status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this is a per-transfer transport failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
