use crate::error::{IssueError, IssueResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use vcissuer_core::{RecordId, RecordStore};

pub const ED25519_SIGNATURE_2018: &str = "Ed25519Signature2018";
pub const JSON_WEB_SIGNATURE_2020: &str = "JsonWebSignature2020";

/// Extra context required by `JsonWebSignature2020` proofs.
pub const JSON_WEB_SIGNATURE_2020_CONTEXT: &str =
    "https://trustbloc.github.io/context/vc/credentials-v1.jsonld";

/// Signature representation used when a profile does not name one.
pub const DEFAULT_REPRESENTATION: &str = "jws";

/// Issuer profile. Identified by `name`; immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub uri: String,
    pub did: String,
    pub signature_type: String,
    pub signature_representation: String,
    /// Verification method used when a request does not name one.
    pub creator: String,
    pub created: DateTime<Utc>,
    #[serde(default, rename = "disableVCStatus")]
    pub disable_status: bool,
    #[serde(default)]
    pub overwrite_issuer: bool,
}

/// Profile creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub signature_type: String,
    #[serde(default)]
    pub signature_representation: Option<String>,
    /// Issuer DID. When absent, the deployment's own issuer DID is used.
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default, rename = "disableVCStatus")]
    pub disable_status: bool,
    #[serde(default)]
    pub overwrite_issuer: bool,
}

impl ProfileRequest {
    pub fn validate(&self) -> IssueResult<()> {
        if self.name.is_empty() {
            return Err(IssueError::InvalidInput("missing profile name".into()));
        }
        if self.uri.is_empty() {
            return Err(IssueError::InvalidInput("missing uri information".into()));
        }
        if !is_absolute_uri(&self.uri) {
            return Err(IssueError::InvalidInput(format!(
                "invalid uri: {}",
                self.uri
            )));
        }
        if self.signature_type.is_empty() {
            return Err(IssueError::InvalidInput("missing signature type".into()));
        }
        Ok(())
    }
}

/// `scheme://rest` with an RFC 3986 scheme and a non-empty rest.
fn is_absolute_uri(uri: &str) -> bool {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_alpha
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !rest.is_empty()
}

impl Profile {
    /// Build a profile from a validated request. `default_did` and
    /// `default_creator` fill in what the request leaves out.
    pub fn from_request(
        request: ProfileRequest,
        default_did: &str,
        default_creator: &str,
    ) -> IssueResult<Self> {
        request.validate()?;
        Ok(Self {
            name: request.name,
            uri: request.uri,
            did: request.did.unwrap_or_else(|| default_did.to_string()),
            signature_type: request.signature_type,
            signature_representation: request
                .signature_representation
                .unwrap_or_else(|| DEFAULT_REPRESENTATION.to_string()),
            creator: request
                .creator
                .unwrap_or_else(|| default_creator.to_string()),
            created: Utc::now(),
            disable_status: request.disable_status,
            overwrite_issuer: request.overwrite_issuer,
        })
    }
}

// ---------------------------------------------------------------------------
// ProfileStore
// ---------------------------------------------------------------------------

pub trait ProfileStore: Send + Sync {
    /// Fails with `NotFound` for an unknown name.
    fn get_profile(&self, name: &str) -> IssueResult<Profile>;

    /// Fails with `InvalidInput` if a profile with that name exists.
    fn create_profile(&self, profile: &Profile) -> IssueResult<()>;
}

/// Profiles stored as JSON records under `profile/<name>`.
pub struct RecordProfileStore {
    store: Arc<dyn RecordStore>,
}

impl RecordProfileStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

fn profile_record(name: &str) -> RecordId {
    RecordId::new(format!("profile/{}", name))
}

impl ProfileStore for RecordProfileStore {
    fn get_profile(&self, name: &str) -> IssueResult<Profile> {
        match self.store.get(&profile_record(name))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(IssueError::NotFound(format!(
                "profile '{}' does not exist",
                name
            ))),
        }
    }

    fn create_profile(&self, profile: &Profile) -> IssueResult<()> {
        let bytes = serde_json::to_vec(profile)?;
        if !self.store.put_if_absent(&profile_record(&profile.name), &bytes)? {
            return Err(IssueError::InvalidInput(format!(
                "profile {} already exists",
                profile.name
            )));
        }
        info!(profile = %profile.name, did = %profile.did, "created issuer profile");
        Ok(())
    }
}
