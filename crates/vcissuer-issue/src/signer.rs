use crate::credential::Credential;
use crate::error::{IssueError, IssueResult};
use crate::options::SigningOptions;
use crate::profile::{Profile, ED25519_SIGNATURE_2018, JSON_WEB_SIGNATURE_2020};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::SecondsFormat;
use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey, VerifyingKey};
use serde_json::{json, Map, Value};
use zeroize::Zeroizing;

/// Multicodec prefix of an Ed25519 public key in a `did:key`.
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Protected header of a detached, unencoded-payload JWS.
const DETACHED_JWS_HEADER: &str = r#"{"alg":"EdDSA","b64":false,"crit":["b64"]}"#;

/// Signs a credential on behalf of a profile.
pub trait CredentialSigner: Send + Sync {
    fn sign(
        &self,
        profile: &Profile,
        credential: Credential,
        options: &SigningOptions,
    ) -> IssueResult<Credential>;
}

/// Reference signer with a single Ed25519 key.
///
/// The proof records the requested verification method but is always made
/// with this signer's key. The signed message is the proof options (without
/// the signature member) followed by `.` and the credential without proofs.
pub struct Ed25519CredentialSigner {
    signing_key: Zeroizing<[u8; 32]>,
    verifying_key: [u8; 32],
}

impl Ed25519CredentialSigner {
    pub fn from_seed(seed: Zeroizing<[u8; 32]>) -> Self {
        let verifying_key = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
        Self {
            signing_key: seed,
            verifying_key,
        }
    }

    /// Create a signer from raw key bytes (for testing).
    pub fn from_bytes(key_bytes: [u8; 32]) -> Self {
        Self::from_seed(Zeroizing::new(key_bytes))
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key
    }

    /// `did:key` of the signing key.
    pub fn did(&self) -> String {
        format!("did:key:{}", self.multibase_key())
    }

    /// Verification method ID of the signing key within its `did:key`.
    pub fn key_id(&self) -> String {
        format!("{}#{}", self.did(), self.multibase_key())
    }

    fn multibase_key(&self) -> String {
        let mut bytes = Vec::with_capacity(34);
        bytes.extend_from_slice(&ED25519_MULTICODEC);
        bytes.extend_from_slice(&self.verifying_key);
        format!("z{}", bs58::encode(bytes).into_string())
    }

    /// Check the most recent proof on `credential` against this signer's key.
    pub fn verify(&self, credential: &Credential) -> IssueResult<bool> {
        let proof = match &credential.proof {
            Some(Value::Array(proofs)) => proofs.last(),
            Some(single) => Some(single),
            None => None,
        }
        .and_then(Value::as_object)
        .ok_or_else(|| IssueError::InvalidInput("credential carries no proof".into()))?;

        let mut options = proof.clone();
        let payload = credential.signing_payload()?;

        let (signed, signature) = if let Some(Value::String(jws)) = options.remove("jws") {
            let (header, sig) = jws.split_once("..").ok_or_else(|| {
                IssueError::InvalidInput("jws is not a detached compact JWS".into())
            })?;
            let mut signed = header.as_bytes().to_vec();
            signed.push(b'.');
            signed.extend(signing_message(&options, &payload)?);
            (signed, sig.to_string())
        } else if let Some(Value::String(value)) = options.remove("proofValue") {
            (signing_message(&options, &payload)?, value)
        } else {
            return Err(IssueError::InvalidInput(
                "proof has neither jws nor proofValue".into(),
            ));
        };

        let sig_bytes: [u8; 64] = URL_SAFE_NO_PAD
            .decode(signature)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| IssueError::InvalidInput("malformed proof signature".into()))?;
        let vk = VerifyingKey::from_bytes(&self.verifying_key)
            .map_err(|e| IssueError::Signing(format!("invalid verifying key: {}", e)))?;
        Ok(vk
            .verify_strict(&signed, &Signature::from_bytes(&sig_bytes))
            .is_ok())
    }
}

fn signing_message(options: &Map<String, Value>, payload: &[u8]) -> IssueResult<Vec<u8>> {
    let mut message = serde_json::to_vec(options)?;
    message.push(b'.');
    message.extend_from_slice(payload);
    Ok(message)
}

impl CredentialSigner for Ed25519CredentialSigner {
    fn sign(
        &self,
        profile: &Profile,
        mut credential: Credential,
        options: &SigningOptions,
    ) -> IssueResult<Credential> {
        if profile.signature_type != ED25519_SIGNATURE_2018
            && profile.signature_type != JSON_WEB_SIGNATURE_2020
        {
            return Err(IssueError::Signing(format!(
                "signature type {} is not supported",
                profile.signature_type
            )));
        }

        let opts = options.clone().with_profile_defaults(profile);
        let mut proof = Map::new();
        proof.insert("type".into(), json!(profile.signature_type));
        if let Some(created) = opts.created {
            proof.insert(
                "created".into(),
                json!(created.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
        proof.insert("verificationMethod".into(), json!(opts.verification_method));
        proof.insert("proofPurpose".into(), json!(opts.purpose));
        if let Some(challenge) = &opts.challenge {
            proof.insert("challenge".into(), json!(challenge));
        }
        if let Some(domain) = &opts.domain {
            proof.insert("domain".into(), json!(domain));
        }

        let message = signing_message(&proof, &credential.signing_payload()?)?;
        let key = SigningKey::from_bytes(&self.signing_key);

        match opts.representation.as_deref() {
            Some("jws") | None => {
                let header = URL_SAFE_NO_PAD.encode(DETACHED_JWS_HEADER);
                let mut signed = header.as_bytes().to_vec();
                signed.push(b'.');
                signed.extend(message);
                let sig = key.sign(&signed);
                proof.insert(
                    "jws".into(),
                    json!(format!("{}..{}", header, URL_SAFE_NO_PAD.encode(sig.to_bytes()))),
                );
            }
            Some("proofValue") => {
                let sig = key.sign(&message);
                proof.insert(
                    "proofValue".into(),
                    json!(URL_SAFE_NO_PAD.encode(sig.to_bytes())),
                );
            }
            Some(other) => {
                return Err(IssueError::InvalidInput(format!(
                    "signature representation {} is not supported",
                    other
                )))
            }
        }

        credential.push_proof(Value::Object(proof));
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::W3C_CREDENTIALS_CONTEXT;
    use chrono::Utc;

    fn profile(signature_type: &str, representation: &str) -> Profile {
        Profile {
            name: "issuer".into(),
            uri: "https://example.com".into(),
            did: "did:example:issuer".into(),
            signature_type: signature_type.into(),
            signature_representation: representation.into(),
            creator: "did:example:issuer#key-1".into(),
            created: Utc::now(),
            disable_status: false,
            overwrite_issuer: false,
        }
    }

    fn credential() -> Credential {
        Credential::parse(
            serde_json::to_string(&json!({
                "@context": [W3C_CREDENTIALS_CONTEXT],
                "type": ["VerifiableCredential"],
                "issuer": "did:example:issuer",
                "credentialSubject": {"id": "did:example:holder"}
            }))
            .unwrap()
            .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_sign_jws_and_verify() {
        let signer = Ed25519CredentialSigner::from_bytes([0x42; 32]);
        let signed = signer
            .sign(
                &profile(ED25519_SIGNATURE_2018, "jws"),
                credential(),
                &SigningOptions::default(),
            )
            .unwrap();
        let proof = signed.proof.as_ref().unwrap();
        assert_eq!(proof["type"], ED25519_SIGNATURE_2018);
        assert_eq!(proof["verificationMethod"], "did:example:issuer#key-1");
        assert_eq!(proof["proofPurpose"], "assertionMethod");
        assert!(proof["jws"].as_str().unwrap().contains(".."));
        assert!(signer.verify(&signed).unwrap());
    }

    #[test]
    fn test_sign_proof_value_and_verify() {
        let signer = Ed25519CredentialSigner::from_bytes([0x42; 32]);
        let signed = signer
            .sign(
                &profile(JSON_WEB_SIGNATURE_2020, "proofValue"),
                credential(),
                &SigningOptions::default(),
            )
            .unwrap();
        assert!(signed.proof.as_ref().unwrap().get("proofValue").is_some());
        assert!(signer.verify(&signed).unwrap());
    }

    #[test]
    fn test_tampering_breaks_verification() {
        let signer = Ed25519CredentialSigner::from_bytes([0x42; 32]);
        let mut signed = signer
            .sign(
                &profile(ED25519_SIGNATURE_2018, "jws"),
                credential(),
                &SigningOptions::default(),
            )
            .unwrap();
        signed.credential_subject["id"] = json!("did:example:mallory");
        assert!(!signer.verify(&signed).unwrap());

        let other = Ed25519CredentialSigner::from_bytes([0x43; 32]);
        let signed = signer
            .sign(
                &profile(ED25519_SIGNATURE_2018, "jws"),
                credential(),
                &SigningOptions::default(),
            )
            .unwrap();
        assert!(!other.verify(&signed).unwrap());
    }

    #[test]
    fn test_options_recorded_in_proof() {
        let signer = Ed25519CredentialSigner::from_bytes([0x42; 32]);
        let options = SigningOptions {
            verification_method: Some("did:example:issuer#key-2".into()),
            purpose: Some("authentication".into()),
            challenge: Some("c-1".into()),
            domain: Some("example.com".into()),
            ..Default::default()
        };
        let signed = signer
            .sign(&profile(ED25519_SIGNATURE_2018, "jws"), credential(), &options)
            .unwrap();
        let proof = signed.proof.as_ref().unwrap();
        assert_eq!(proof["verificationMethod"], "did:example:issuer#key-2");
        assert_eq!(proof["proofPurpose"], "authentication");
        assert_eq!(proof["challenge"], "c-1");
        assert_eq!(proof["domain"], "example.com");
        assert!(signer.verify(&signed).unwrap());
    }

    #[test]
    fn test_unsupported_type_and_representation() {
        let signer = Ed25519CredentialSigner::from_bytes([0x42; 32]);
        assert!(matches!(
            signer.sign(
                &profile("RsaSignature2018", "jws"),
                credential(),
                &SigningOptions::default()
            ),
            Err(IssueError::Signing(_))
        ));
        assert!(matches!(
            signer.sign(
                &profile(ED25519_SIGNATURE_2018, "cbor"),
                credential(),
                &SigningOptions::default()
            ),
            Err(IssueError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_did_key_format() {
        let signer = Ed25519CredentialSigner::from_bytes([0x42; 32]);
        assert!(signer.did().starts_with("did:key:z6Mk"));
        assert!(signer.key_id().starts_with(&signer.did()));
        assert_eq!(
            signer.did(),
            Ed25519CredentialSigner::from_bytes([0x42; 32]).did()
        );
    }
}
