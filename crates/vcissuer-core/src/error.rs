use thiserror::Error;

/// Error reported by a collaborator (vault gateway, record store, cipher, MAC).
///
/// `VaultNotFound` is kept distinct from the generic `Vault` variant because
/// the store path recovers from it by creating the vault once.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("vault not found: {0}")]
    VaultNotFound(String),

    #[error("vault already exists: {0}")]
    VaultExists(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("vault error: {0}")]
    Vault(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_vault_not_found(&self) -> bool {
        matches!(self, CoreError::VaultNotFound(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
