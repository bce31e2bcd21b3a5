use crate::compose::{build_credential, ComposeCredentialRequest};
use crate::credential::{Credential, Issuer, TypedId};
use crate::error::{IssueError, IssueResult};
use crate::options::{IssueCredentialOptions, SigningOptions};
use crate::profile::{
    Profile, DEFAULT_REPRESENTATION, JSON_WEB_SIGNATURE_2020, JSON_WEB_SIGNATURE_2020_CONTEXT,
};
use crate::signer::CredentialSigner;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vcissuer_status::{SlotAllocator, SlotRef, StatusError, STATUS_LIST_CONTEXT, STATUS_LIST_TYPE};

// ---------------------------------------------------------------------------
// IssuanceOrchestrator
//
// issue:   validate options -> prepare -> sign
// compose: build -> decode options -> prepare -> sign
//
// prepare attaches a status slot (or strips one when the profile does not
// track status), adds profile-driven contexts and rewrites the issuer. A slot
// claimed for an issuance that later fails stays claimed and is never
// referenced.
// ---------------------------------------------------------------------------

pub struct IssuanceOrchestrator {
    allocator: Arc<dyn SlotAllocator>,
    signer: Arc<dyn CredentialSigner>,
    status_context: String,
    default_representation: String,
}

impl IssuanceOrchestrator {
    pub fn new(allocator: Arc<dyn SlotAllocator>, signer: Arc<dyn CredentialSigner>) -> Self {
        Self {
            allocator,
            signer,
            status_context: STATUS_LIST_CONTEXT.to_string(),
            default_representation: DEFAULT_REPRESENTATION.to_string(),
        }
    }

    /// Vocabulary URL declared alongside an attached status reference.
    pub fn with_status_context(mut self, context: impl Into<String>) -> Self {
        self.status_context = context.into();
        self
    }

    /// Representation used by compose when the request names no proof format.
    pub fn with_default_representation(mut self, representation: impl Into<String>) -> Self {
        self.default_representation = representation.into();
        self
    }

    /// Issue a complete credential body under `profile`.
    pub fn issue(
        &self,
        profile: &Profile,
        mut credential: Credential,
        options: Option<&IssueCredentialOptions>,
    ) -> IssueResult<Credential> {
        if let Some(Err(e)) = options.map(IssueCredentialOptions::validate) {
            warn!(profile = %profile.name, error = %e, "rejected issue options");
            return Err(e);
        }
        let signing = SigningOptions::from_issue_options(options);

        self.prepare(profile, &mut credential)?;
        self.sign(profile, credential, &signing)
    }

    /// Build a credential from parts, then issue it under `profile`.
    pub fn compose_and_issue(
        &self,
        profile: &Profile,
        request: &ComposeCredentialRequest,
    ) -> IssueResult<Credential> {
        let mut credential = build_credential(request)?;
        // Options are decoded before a slot is claimed so a malformed
        // request does not consume one.
        let signing = SigningOptions::from_compose(
            request.proof_format.as_deref(),
            request.proof_format_options.as_ref(),
            &self.default_representation,
        )?;

        self.prepare(profile, &mut credential)?;
        self.sign(profile, credential, &signing)
    }

    /// Set the status of the slot referenced by `credential`.
    pub fn update_credential_status(
        &self,
        profile: &Profile,
        credential: &Credential,
        status: &str,
        reason: &str,
    ) -> IssueResult<()> {
        if profile.disable_status {
            return Err(IssueError::InvalidInput(format!(
                "vc status is disabled for profile {}",
                profile.name
            )));
        }
        let reference = credential
            .credential_status
            .as_ref()
            .filter(|s| s.type_name == STATUS_LIST_TYPE)
            .ok_or_else(|| {
                IssueError::InvalidInput(format!(
                    "credential has no {} status reference",
                    STATUS_LIST_TYPE
                ))
            })?;
        let slot: SlotRef = reference.id.parse().map_err(status_error)?;

        self.allocator
            .update(&slot, status, reason)
            .map_err(status_error)?;
        info!(profile = %profile.name, slot = %slot, status, "updated credential status");
        Ok(())
    }

    fn prepare(&self, profile: &Profile, credential: &mut Credential) -> IssueResult<()> {
        if profile.disable_status {
            let tracked = credential
                .credential_status
                .as_ref()
                .is_some_and(|s| s.type_name == STATUS_LIST_TYPE);
            if tracked {
                credential.credential_status = None;
            }
            credential.remove_context(&self.status_context);
        } else {
            let slot = self
                .allocator
                .allocate()
                .map_err(|e| IssueError::upstream("while allocating status slot", e))?;
            debug!(profile = %profile.name, slot = %slot.slot_ref(), "attached status slot");
            credential.credential_status =
                Some(TypedId::new(slot.slot_ref().to_string(), STATUS_LIST_TYPE));
            credential.add_context(&self.status_context);
        }

        if profile.signature_type == JSON_WEB_SIGNATURE_2020 {
            credential.add_context(JSON_WEB_SIGNATURE_2020_CONTEXT);
        }

        if profile.overwrite_issuer || credential.issuer.id.is_empty() {
            credential.issuer = Issuer::with_name(profile.did.clone(), profile.name.clone());
        }
        Ok(())
    }

    fn sign(
        &self,
        profile: &Profile,
        credential: Credential,
        options: &SigningOptions,
    ) -> IssueResult<Credential> {
        let signed = self
            .signer
            .sign(profile, credential, options)
            .map_err(|e| match e {
                IssueError::InvalidInput(_) => e,
                other => IssueError::upstream("while signing credential", other),
            })?;
        info!(
            profile = %profile.name,
            status = ?signed.credential_status.as_ref().map(|s| s.id.as_str()),
            "issued credential"
        );
        Ok(signed)
    }
}

fn status_error(e: StatusError) -> IssueError {
    match e {
        StatusError::InvalidInput(m) => IssueError::InvalidInput(m),
        StatusError::NotFound(m) => IssueError::NotFound(m),
        other => IssueError::upstream("while updating status slot", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::W3C_CREDENTIALS_CONTEXT;
    use crate::profile::ED25519_SIGNATURE_2018;
    use crate::signer::Ed25519CredentialSigner;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vcissuer_status::{StatusListAllocator, StatusResult, StatusSlot};
    use vcissuer_vault::in_memory_store::MemoryStore;

    const BASE: &str = "https://issuer.example.com/status";

    struct Fixture {
        allocator: Arc<StatusListAllocator>,
        signer: Arc<Ed25519CredentialSigner>,
        orchestrator: IssuanceOrchestrator,
    }

    fn fixture() -> Fixture {
        let allocator =
            Arc::new(StatusListAllocator::open(Arc::new(MemoryStore::new()), BASE, 50).unwrap());
        let signer = Arc::new(Ed25519CredentialSigner::from_bytes([7; 32]));
        let orchestrator = IssuanceOrchestrator::new(allocator.clone(), signer.clone());
        Fixture {
            allocator,
            signer,
            orchestrator,
        }
    }

    fn profile() -> Profile {
        Profile {
            name: "university".into(),
            uri: "https://university.example.com".into(),
            did: "did:example:university".into(),
            signature_type: ED25519_SIGNATURE_2018.into(),
            signature_representation: "jws".into(),
            creator: "did:example:university#key-1".into(),
            created: Utc::now(),
            disable_status: false,
            overwrite_issuer: false,
        }
    }

    fn credential(issuer: &str) -> Credential {
        let body = json!({
            "@context": [W3C_CREDENTIALS_CONTEXT],
            "type": ["VerifiableCredential", "UniversityDegreeCredential"],
            "issuer": issuer,
            "credentialSubject": {"id": "did:example:student"}
        });
        Credential::parse(&serde_json::to_vec(&body).unwrap()).unwrap()
    }

    struct FailingAllocator {
        calls: AtomicUsize,
    }

    impl SlotAllocator for FailingAllocator {
        fn allocate(&self) -> StatusResult<StatusSlot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StatusError::Storage("disk full".into()))
        }

        fn update(&self, _: &SlotRef, _: &str, _: &str) -> StatusResult<()> {
            Err(StatusError::Storage("disk full".into()))
        }
    }

    #[test]
    fn test_issue_attaches_status_and_signs() {
        let f = fixture();
        let vc = f
            .orchestrator
            .issue(&profile(), credential("did:example:other"), None)
            .unwrap();

        let status = vc.credential_status.as_ref().unwrap();
        assert_eq!(status.id, format!("{}/1#0", BASE));
        assert_eq!(status.type_name, STATUS_LIST_TYPE);
        assert!(vc.has_context(STATUS_LIST_CONTEXT));
        // Issuer kept: overwrite not requested and ID present.
        assert_eq!(vc.issuer.id, "did:example:other");
        assert!(f.signer.verify(&vc).unwrap());

        let second = f
            .orchestrator
            .issue(&profile(), credential("did:example:other"), None)
            .unwrap();
        assert_eq!(
            second.credential_status.unwrap().id,
            format!("{}/1#1", BASE)
        );
    }

    #[test]
    fn test_disabled_status_strips_reference_and_context() {
        let f = fixture();
        let mut vc = credential("did:example:other");
        vc.credential_status = Some(TypedId::new(format!("{}/9#3", BASE), STATUS_LIST_TYPE));
        vc.add_context(STATUS_LIST_CONTEXT);

        let p = Profile {
            disable_status: true,
            ..profile()
        };
        let issued = f.orchestrator.issue(&p, vc, None).unwrap();
        assert!(issued.credential_status.is_none());
        assert!(!issued.has_context(STATUS_LIST_CONTEXT));
        // Nothing was allocated.
        assert_eq!(f.allocator.allocate().unwrap().index, 0);
    }

    #[test]
    fn test_overwrite_issuer_sets_did_and_name() {
        let f = fixture();
        let p = Profile {
            overwrite_issuer: true,
            ..profile()
        };
        let vc = f
            .orchestrator
            .issue(&p, credential("did:example:other"), None)
            .unwrap();
        assert_eq!(vc.issuer.id, "did:example:university");
        assert_eq!(vc.issuer.name(), Some("university"));

        let json = serde_json::to_value(&vc).unwrap();
        assert_eq!(json["issuer"]["id"], "did:example:university");
        assert_eq!(json["issuer"]["name"], "university");
    }

    #[test]
    fn test_empty_issuer_filled_from_profile() {
        let f = fixture();
        let vc = f.orchestrator.issue(&profile(), credential(""), None).unwrap();
        assert_eq!(vc.issuer.id, "did:example:university");
    }

    #[test]
    fn test_jws2020_adds_context() {
        let f = fixture();
        let p = Profile {
            signature_type: JSON_WEB_SIGNATURE_2020.into(),
            ..profile()
        };
        let vc = f.orchestrator.issue(&p, credential("did:x"), None).unwrap();
        assert!(vc.has_context(JSON_WEB_SIGNATURE_2020_CONTEXT));
        assert_eq!(vc.context[0], W3C_CREDENTIALS_CONTEXT);
    }

    #[test]
    fn test_allocation_failure_aborts_issuance() {
        let allocator = Arc::new(FailingAllocator {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = IssuanceOrchestrator::new(
            allocator.clone(),
            Arc::new(Ed25519CredentialSigner::from_bytes([7; 32])),
        );
        let err = orchestrator
            .issue(&profile(), credential("did:x"), None)
            .unwrap_err();
        assert!(err.to_string().starts_with("while allocating status slot"));
        assert_eq!(allocator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_options_rejected_before_allocation() {
        let allocator = Arc::new(FailingAllocator {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = IssuanceOrchestrator::new(
            allocator.clone(),
            Arc::new(Ed25519CredentialSigner::from_bytes([7; 32])),
        );
        let options = IssueCredentialOptions {
            proof_purpose: Some("bogus".into()),
            ..Default::default()
        };
        let err = orchestrator
            .issue(&profile(), credential("did:x"), Some(&options))
            .unwrap_err();
        assert!(matches!(err, IssueError::InvalidInput(_)));

        let request: ComposeCredentialRequest =
            serde_json::from_value(json!({"subject": "did:x", "proofFormatOptions": "kid"}))
                .unwrap();
        assert!(matches!(
            orchestrator.compose_and_issue(&profile(), &request),
            Err(IssueError::InvalidInput(_))
        ));
        assert_eq!(allocator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsupported_signature_type_is_upstream() {
        let f = fixture();
        let p = Profile {
            signature_type: "BbsBlsSignature2020".into(),
            ..profile()
        };
        let err = f
            .orchestrator
            .issue(&p, credential("did:x"), None)
            .unwrap_err();
        assert!(matches!(err, IssueError::Upstream { .. }));
    }

    #[test]
    fn test_compose_and_issue() {
        let f = fixture();
        let request: ComposeCredentialRequest = serde_json::from_value(json!({
            "issuer": "did:example:other",
            "subject": "did:example:student",
            "types": ["VerifiableCredential", "DegreeCredential"],
            "claims": {"degree": "BSc"},
            "proofFormat": "proofValue",
            "proofFormatOptions": {"kid": "did:example:university#key-2"}
        }))
        .unwrap();
        let vc = f.orchestrator.compose_and_issue(&profile(), &request).unwrap();
        assert_eq!(vc.credential_subject["degree"], "BSc");
        assert!(vc.credential_status.is_some());
        let proof = vc.proof.as_ref().unwrap();
        assert_eq!(proof["verificationMethod"], "did:example:university#key-2");
        assert!(proof.get("proofValue").is_some());
        assert!(f.signer.verify(&vc).unwrap());
    }

    #[test]
    fn test_update_credential_status() {
        let f = fixture();
        let vc = f.orchestrator.issue(&profile(), credential("did:x"), None).unwrap();
        f.orchestrator
            .update_credential_status(&profile(), &vc, "revoked", "key compromise")
            .unwrap();

        let slot = f.allocator.get(&format!("{}/1", BASE)).unwrap().slot(0).unwrap();
        assert_eq!(slot.status.as_deref(), Some("revoked"));
        assert_eq!(slot.reason, "key compromise");
    }

    #[test]
    fn test_update_credential_status_rejections() {
        let f = fixture();
        let disabled = Profile {
            disable_status: true,
            ..profile()
        };
        let err = f
            .orchestrator
            .update_credential_status(&disabled, &credential("did:x"), "revoked", "")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid input: vc status is disabled for profile university"
        );

        assert!(matches!(
            f.orchestrator
                .update_credential_status(&profile(), &credential("did:x"), "revoked", ""),
            Err(IssueError::InvalidInput(_))
        ));

        let mut unclaimed = credential("did:x");
        unclaimed.credential_status =
            Some(TypedId::new(format!("{}/1#40", BASE), STATUS_LIST_TYPE));
        assert!(matches!(
            f.orchestrator
                .update_credential_status(&profile(), &unclaimed, "revoked", ""),
            Err(IssueError::NotFound(_))
        ));
    }
}
