use crate::error::{VaultError, VaultResult};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use tracing::info;
use vcissuer_core::{RecordId, RecordStore};
use zeroize::Zeroizing;

/// Record under which the deployment root key is persisted.
pub const ROOT_KEY_RECORD: &str = "deployment/root-key";

/// Key material of one deployment:
///
/// ```text
/// RootKey (32 random bytes, persisted on first start)
///   → BlindIndexKey (HKDF, "blind-index")   MAC key for logical IDs
///   → EnvelopeKey   (HKDF, "envelope")      AES-256-GCM document key
///   → IssuerKey     (HKDF, "issuer-signing") Ed25519 seed of the reference signer
/// ```
///
/// The root key must survive restarts: a regenerated key would change every
/// blind index and orphan every stored credential. Keep it in a store of its
/// own. Anyone who reads it next to the vault documents can recompute blind
/// indexes and decrypt envelopes.
pub struct DeploymentKeys {
    root_key: Zeroizing<[u8; 32]>,
}

impl DeploymentKeys {
    /// Load the persisted root key, or generate and persist one.
    ///
    /// Uses put-if-absent so two processes starting against an empty store
    /// converge on whichever key landed first.
    pub fn load_or_create(store: &dyn RecordStore) -> VaultResult<Self> {
        let record = RecordId::new(ROOT_KEY_RECORD);
        if let Some(existing) = read_root_key(store, &record)? {
            return Ok(Self { root_key: existing });
        }

        let mut fresh = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut *fresh);
        let inserted = store
            .put_if_absent(&record, &*fresh)
            .map_err(|e| VaultError::Storage(format!("failed to persist root key: {}", e)))?;
        if inserted {
            info!("generated new deployment root key");
            return Ok(Self { root_key: fresh });
        }

        let winner = read_root_key(store, &record)?.ok_or_else(|| {
            VaultError::Storage("root key vanished after concurrent creation".into())
        })?;
        Ok(Self { root_key: winner })
    }

    /// Build from a raw 32-byte root key (for testing).
    pub fn from_raw_key(key: [u8; 32]) -> Self {
        Self {
            root_key: Zeroizing::new(key),
        }
    }

    pub fn blind_index_key(&self) -> VaultResult<Zeroizing<[u8; 32]>> {
        self.hkdf_derive(b"blind-index", b"vcissuer-blind-index-key")
    }

    pub fn envelope_key(&self) -> VaultResult<Zeroizing<[u8; 32]>> {
        self.hkdf_derive(b"envelope", b"vcissuer-envelope-key")
    }

    pub fn issuer_signing_seed(&self) -> VaultResult<Zeroizing<[u8; 32]>> {
        self.hkdf_derive(b"issuer-signing", b"vcissuer-issuer-signing-key")
    }

    /// HKDF-SHA256 key derivation from the root key.
    fn hkdf_derive(&self, salt: &[u8], info: &[u8]) -> VaultResult<Zeroizing<[u8; 32]>> {
        let hk = Hkdf::<Sha256>::new(Some(salt), &*self.root_key);
        let mut okm = Zeroizing::new([0u8; 32]);
        hk.expand(info, &mut *okm)
            .map_err(|e| VaultError::KeyDerivation(format!("HKDF expand failed: {}", e)))?;
        Ok(okm)
    }
}

fn read_root_key(
    store: &dyn RecordStore,
    record: &RecordId,
) -> VaultResult<Option<Zeroizing<[u8; 32]>>> {
    let stored = store
        .get(record)
        .map_err(|e| VaultError::Storage(format!("failed to read root key: {}", e)))?;
    match stored {
        None => Ok(None),
        Some(bytes) => {
            let bytes = Zeroizing::new(bytes);
            let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                VaultError::KeyDerivation(format!(
                    "persisted root key must be 32 bytes, got {}",
                    bytes.len()
                ))
            })?;
            Ok(Some(Zeroizing::new(key)))
        }
    }
}
