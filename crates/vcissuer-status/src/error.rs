use thiserror::Error;
use vcissuer_core::CoreError;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<CoreError> for StatusError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Serialization(m) => StatusError::Serialization(m),
            other => StatusError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StatusError {
    fn from(e: serde_json::Error) -> Self {
        StatusError::Serialization(e.to_string())
    }
}

pub type StatusResult<T> = Result<T, StatusError>;
