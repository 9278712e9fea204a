//! Payload validation errors.

use thiserror::Error;

/// Errors raised when a payload does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(String),

    /// The payload is valid JSON but not an object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A known panel has the wrong shape.
    #[error("panel '{panel}' is malformed: {reason}")]
    InvalidPanel {
        /// Panel name.
        panel: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A channel message envelope is missing or has a malformed field.
    #[error("malformed '{event}' message: {reason}")]
    InvalidMessage {
        /// Event name from the envelope.
        event: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A time range selector could not be used.
    #[error("invalid time range '{0}'")]
    InvalidRange(String),
}

impl PayloadError {
    pub(crate) fn panel(panel: &str, reason: impl Into<String>) -> Self {
        PayloadError::InvalidPanel {
            panel: panel.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        PayloadError::Json(err.to_string())
    }
}

/// Name of a JSON value's kind, for error messages.
pub(crate) fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
