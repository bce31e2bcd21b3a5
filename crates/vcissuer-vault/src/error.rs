use std::fmt::Display;
use thiserror::Error;

/// Raised when several documents match one logical ID but their decrypted
/// payloads differ.
pub const INCONSISTENT_DUPLICATES_MSG: &str = "multiple credentials with differing contents \
were found matching the given ID. This indicates inconsistency in the credential database. \
To solve this, delete the extra credentials and leave only one";

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    #[error("crypto unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("{context}: {message}")]
    Upstream { context: String, message: String },

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Wrap a collaborator failure with the operation it interrupted.
    pub fn upstream(context: impl Into<String>, err: impl Display) -> Self {
        VaultError::Upstream {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

impl From<VaultError> for vcissuer_core::CoreError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Encryption(_)
            | VaultError::Decryption(_)
            | VaultError::KeyDerivation(_)
            | VaultError::CryptoUnavailable(_) => vcissuer_core::CoreError::Crypto(e.to_string()),
            VaultError::Serialization(m) => vcissuer_core::CoreError::Serialization(m),
            VaultError::Storage(m) => vcissuer_core::CoreError::Storage(m),
            other => vcissuer_core::CoreError::Vault(other.to_string()),
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;
    use vcissuer_core::CoreError;

    #[test]
    fn test_upstream_display_carries_context() {
        let err = VaultError::upstream("while decrypting document", "bad tag");
        assert_eq!(err.to_string(), "while decrypting document: bad tag");
    }

    #[test]
    fn test_into_core_error() {
        let core: CoreError = VaultError::Decryption("tag mismatch".into()).into();
        assert!(matches!(core, CoreError::Crypto(_)));
        let core: CoreError = VaultError::Storage("disk".into()).into();
        assert!(matches!(core, CoreError::Storage(_)));
        let core: CoreError = VaultError::NotFound("x".into()).into();
        assert!(matches!(core, CoreError::Vault(_)));
    }
}
