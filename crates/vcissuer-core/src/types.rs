use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Typed identifiers: prevent stringly-typed confusion
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(
    VaultId,
    "Identifier of an encrypted-document vault (one per issuer profile)."
);
define_id!(
    DocumentId,
    "Vault-compatible opaque document identifier (Base58 of 16 random bytes)."
);
define_id!(
    LogicalId,
    "Caller-chosen identifier of a stored credential. Never sent to the vault in clear."
);
define_id!(
    KeyHandle,
    "Reference to a key held by a crypto collaborator; the key itself never leaves it."
);
define_id!(RecordId, "Key of a record in a `RecordStore`.");
