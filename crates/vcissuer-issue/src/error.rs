use std::fmt::Display;
use thiserror::Error;
use vcissuer_core::CoreError;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{context}: {message}")]
    Upstream { context: String, message: String },

    #[error("signing error: {0}")]
    Signing(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl IssueError {
    pub fn upstream(context: impl Into<String>, err: impl Display) -> Self {
        IssueError::Upstream {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Prefix the message of an `InvalidInput`; other variants pass through.
    pub fn in_step(self, step: &str) -> Self {
        match self {
            IssueError::InvalidInput(m) => IssueError::InvalidInput(format!("{}: {}", step, m)),
            other => other,
        }
    }
}

impl From<CoreError> for IssueError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Serialization(m) => IssueError::Serialization(m),
            CoreError::Signing(m) => IssueError::Signing(m),
            other => IssueError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for IssueError {
    fn from(e: serde_json::Error) -> Self {
        IssueError::Serialization(e.to_string())
    }
}

pub type IssueResult<T> = Result<T, IssueError>;
