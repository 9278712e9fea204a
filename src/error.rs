//! Error types for the sync client.

use heatwatch_types::PayloadError;
use thiserror::Error;

/// Errors surfaced to the user as a non-fatal notice.
///
/// None of these are fatal: the last good rendered state is kept and the
/// error is reported once through the presentation sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// HTTP or network failure, including timeouts.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server sent an `error` message over the live channel.
    #[error("server error: {0}")]
    Channel(String),

    /// A snapshot or update was malformed or missing expected fields.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Transport(_) => "transport",
            SyncError::Channel(_) => "channel",
            SyncError::Protocol(_) => "protocol",
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            SyncError::Protocol(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<PayloadError> for SyncError {
    fn from(err: PayloadError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
