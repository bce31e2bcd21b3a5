use crate::credential::OneOrMany;
use crate::error::{IssueError, IssueResult};
use crate::profile::Profile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ASSERTION_METHOD: &str = "assertionMethod";
pub const AUTHENTICATION: &str = "authentication";
pub const CAPABILITY_DELEGATION: &str = "capabilityDelegation";
pub const CAPABILITY_INVOCATION: &str = "capabilityInvocation";

const PROOF_PURPOSES: [&str; 4] = [
    ASSERTION_METHOD,
    AUTHENTICATION,
    CAPABILITY_DELEGATION,
    CAPABILITY_INVOCATION,
];

// ---------------------------------------------------------------------------
// Issue request options
// ---------------------------------------------------------------------------

/// Options accepted by the issue operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCredentialOptions {
    /// `did#key` shorthand; used when no verification method is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl IssueCredentialOptions {
    /// A given proof purpose must be a known one. Without a purpose, an
    /// assertion method must have the form `did#key`.
    pub fn validate(&self) -> IssueResult<()> {
        if let Some(purpose) = non_empty(&self.proof_purpose) {
            if !PROOF_PURPOSES.contains(&purpose) {
                return Err(IssueError::InvalidInput(format!(
                    "invalid proof option : {}",
                    purpose
                )));
            }
        } else if let Some(method) = non_empty(&self.assertion_method) {
            if method.split('#').count() != 2 {
                return Err(IssueError::InvalidInput(format!(
                    "invalid assertion method : {}",
                    method
                )));
            }
        }
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Compose proof format options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofFormatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl ProofFormatOptions {
    /// Decode one options object or an array of them. Array entries are
    /// folded in order; a later entry's field overrides an earlier one.
    pub fn decode(value: &Value) -> IssueResult<Self> {
        let entries: Vec<ProofFormatOptions> = OneOrMany::parse(value, "proofFormatOptions")?;
        Ok(entries
            .into_iter()
            .fold(ProofFormatOptions::default(), |acc, next| ProofFormatOptions {
                kid: non_empty(&next.kid).map(str::to_string).or(acc.kid),
                proof_purpose: non_empty(&next.proof_purpose)
                    .map(str::to_string)
                    .or(acc.proof_purpose),
                created: next.created.or(acc.created),
            }))
    }
}

// ---------------------------------------------------------------------------
// SigningOptions: what the signer receives
// ---------------------------------------------------------------------------

/// Signing options handed to a `CredentialSigner`. Unset fields fall back to
/// profile defaults via `with_profile_defaults`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningOptions {
    pub verification_method: Option<String>,
    pub purpose: Option<String>,
    pub representation: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub challenge: Option<String>,
    pub domain: Option<String>,
}

impl SigningOptions {
    /// Options for the issue operation. A verification method takes priority
    /// over the assertion-method shorthand.
    pub fn from_issue_options(options: Option<&IssueCredentialOptions>) -> Self {
        let Some(opts) = options else {
            return Self::default();
        };
        let verification_method = non_empty(&opts.verification_method)
            .or_else(|| non_empty(&opts.assertion_method))
            .map(str::to_string);
        Self {
            verification_method,
            purpose: non_empty(&opts.proof_purpose).map(str::to_string),
            representation: None,
            created: opts.created,
            challenge: non_empty(&opts.challenge).map(str::to_string),
            domain: non_empty(&opts.domain).map(str::to_string),
        }
    }

    /// Options for the compose operation: `kid`, purpose and created come
    /// from the proof format options; the representation from `proofFormat`
    /// (default `default_representation`).
    pub fn from_compose(
        proof_format: Option<&str>,
        proof_format_options: Option<&Value>,
        default_representation: &str,
    ) -> IssueResult<Self> {
        let formatted = match proof_format_options {
            Some(v) if !v.is_null() => ProofFormatOptions::decode(v)
                .map_err(|e| e.in_step("failed to prepare signing options"))?,
            _ => ProofFormatOptions::default(),
        };
        let representation = proof_format
            .filter(|f| !f.is_empty())
            .unwrap_or(default_representation)
            .to_string();
        Ok(Self {
            verification_method: formatted.kid,
            purpose: formatted.proof_purpose,
            representation: Some(representation),
            created: formatted.created,
            challenge: None,
            domain: None,
        })
    }

    /// Fill unset fields from the profile: creator as verification method,
    /// `assertionMethod` as purpose, the profile's representation, now as
    /// created.
    pub fn with_profile_defaults(self, profile: &Profile) -> Self {
        Self {
            verification_method: self
                .verification_method
                .or_else(|| Some(profile.creator.clone())),
            purpose: self.purpose.or_else(|| Some(ASSERTION_METHOD.to_string())),
            representation: self
                .representation
                .or_else(|| Some(profile.signature_representation.clone())),
            created: self.created.or_else(|| Some(Utc::now())),
            challenge: self.challenge,
            domain: self.domain,
        }
    }
}
