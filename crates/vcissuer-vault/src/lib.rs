//! Encrypted credential storage.
//!
//! Credentials are sealed into AES-256-GCM envelopes and written to a remote
//! vault together with a blind index of their logical ID. The vault can
//! answer exact-match queries on the index but never sees the ID itself.
//!
//! Reads tolerate an eventually-consistent vault: several documents may match
//! one index value. Identical payloads are interchangeable; differing payloads
//! surface as `VaultError::InconsistentState`.

pub mod blind_index;
pub mod builder;
pub mod credential_vault;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod in_memory_store;
pub mod key_hierarchy;
pub mod mac;
pub mod reconcile;

#[cfg(feature = "sqlite")]
pub mod storage;

pub use blind_index::BlindIndexer;
pub use builder::EnvelopeBuilder;
pub use credential_vault::CredentialVault;
pub use error::*;
pub use reconcile::ConsistencyReconciler;
