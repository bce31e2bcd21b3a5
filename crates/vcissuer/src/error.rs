use thiserror::Error;
use vcissuer_core::CoreError;
use vcissuer_issue::IssueError;
use vcissuer_status::StatusError;
use vcissuer_vault::VaultError;

/// Error type of the root crate, aggregating the errors of every subsystem.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("status error: {0}")]
    Status(#[from] StatusError),

    #[error("issue error: {0}")]
    Issue(#[from] IssueError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Caller-facing error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Upstream,
    Internal,
}

impl ErrorKind {
    /// HTTP status an outer transport would answer with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Upstream | ErrorKind::Internal => 500,
        }
    }
}

impl RootError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RootError::Core(e) => match e {
                CoreError::VaultNotFound(_) | CoreError::DocumentNotFound(_) => {
                    ErrorKind::NotFound
                }
                CoreError::VaultExists(_) => ErrorKind::Conflict,
                _ => ErrorKind::Internal,
            },
            RootError::Vault(e) => match e {
                VaultError::InvalidInput(_) => ErrorKind::InvalidInput,
                VaultError::NotFound(_) => ErrorKind::NotFound,
                VaultError::InconsistentState(_) => ErrorKind::Conflict,
                VaultError::Upstream { .. } | VaultError::CryptoUnavailable(_) => {
                    ErrorKind::Upstream
                }
                _ => ErrorKind::Internal,
            },
            RootError::Status(e) => match e {
                StatusError::InvalidInput(_) => ErrorKind::InvalidInput,
                StatusError::NotFound(_) => ErrorKind::NotFound,
                _ => ErrorKind::Internal,
            },
            RootError::Issue(e) => match e {
                IssueError::InvalidInput(_) => ErrorKind::InvalidInput,
                IssueError::NotFound(_) => ErrorKind::NotFound,
                IssueError::Upstream { .. } | IssueError::Signing(_) => ErrorKind::Upstream,
                _ => ErrorKind::Internal,
            },
            RootError::Serialization(_) => ErrorKind::InvalidInput,
            RootError::Config(_) | RootError::Io(_) | RootError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<serde_json::Error> for RootError {
    fn from(e: serde_json::Error) -> Self {
        RootError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

pub type RootResult<T> = Result<T, RootError>;
