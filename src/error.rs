//! Error types for the live-records client.

use thiserror::Error;

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request failed with status {status} ({reason}): {message}")]
    Status {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid record: {0}")]
    Validation(String),

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Request requires a signature but no signer is configured")]
    MissingSigner,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Build an error from a non-2xx response.
    ///
    /// `reason` is the server's machine-readable code (e.g. `record/not-found`).
    pub fn from_status(status: u16, reason: Option<String>, message: Option<String>) -> Self {
        let reason = reason.unwrap_or_else(|| "unknown/error".to_string());
        let message = message.unwrap_or_default();
        match reason.as_str() {
            "record/not-found" => ClientError::RecordNotFound(message),
            "collection/not-found" => ClientError::CollectionNotFound(message),
            _ => ClientError::Status {
                status,
                reason,
                message,
            },
        }
    }

    /// Whether the error came back from the remote side rather than the client.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ClientError::Status { .. }
                | ClientError::RecordNotFound(_)
                | ClientError::CollectionNotFound(_)
        )
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            ClientError::Deserialization(e.to_string())
        } else {
            ClientError::Serialization(e.to_string())
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Deserialization(e.to_string())
        } else {
            ClientError::Http(e.to_string())
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
