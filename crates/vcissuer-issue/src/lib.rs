//! Credential issuance.
//!
//! Takes a credential body (supplied whole or composed from claims), attaches
//! a status-list slot when the profile tracks status, stamps issuer and
//! context metadata from the profile and hands the result to a signer.
//! Any failure aborts the issuance; a credential is never returned without
//! the slot it asked for.

pub mod compose;
pub mod credential;
pub mod error;
pub mod issuance;
pub mod options;
pub mod profile;
pub mod signer;

pub use compose::{build_credential, ComposeCredentialRequest};
pub use credential::{ContextEntry, Credential, Issuer, OneOrMany, TypedId};
pub use error::{IssueError, IssueResult};
pub use issuance::IssuanceOrchestrator;
pub use options::{IssueCredentialOptions, SigningOptions};
pub use profile::{Profile, ProfileRequest, ProfileStore, RecordProfileStore};
pub use signer::{CredentialSigner, Ed25519CredentialSigner};
