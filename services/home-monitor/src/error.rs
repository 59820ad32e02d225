//! Error types for the home monitor service

use std::fmt;

use hm_client::ClientError;

/// A login form field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors that can occur in the home monitor service
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Invalid form: {}", join_fields(.0))]
    Form(Vec<FieldError>),

    #[error("Throttle interval {0} ms is not one of the supported intervals")]
    InvalidThrottle(u64),

    #[error("Sensor data rejected: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl MonitorError {
    /// True when the session is gone and the user must log in again
    pub fn is_session_terminated(&self) -> bool {
        matches!(self, MonitorError::Client(ClientError::SessionTerminated))
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for home monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;
