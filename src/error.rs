//! Error types shared by the backend client, the location sources and the
//! speech adapters.

use thiserror::Error;

/// Why a guarded future stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    Cancelled,
    TimedOut,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Timed out")]
    TimedOut,

    #[error("Cancelled")]
    Cancelled,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status: {0}")]
    Status(u16),

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ClientError {
    /// True for a caller-initiated abort or a hard timeout.
    pub fn is_abort(&self) -> bool {
        matches!(self, ClientError::TimedOut | ClientError::Cancelled)
    }
}

impl From<Abort> for ClientError {
    fn from(abort: Abort) -> Self {
        match abort {
            Abort::Cancelled => ClientError::Cancelled,
            Abort::TimedOut => ClientError::TimedOut,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
