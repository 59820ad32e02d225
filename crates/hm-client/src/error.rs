//! Error types for the GraphQL session client

/// Errors that can occur while talking to the GraphQL backend
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Credential expired")]
    AuthExpired,

    #[error("Session terminated: credential refresh failed")]
    SessionTerminated,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl ClientError {
    /// True when the error means the credential was rejected as expired
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ClientError::AuthExpired)
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
