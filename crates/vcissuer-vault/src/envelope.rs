use crate::error::{VaultError, VaultResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce as AesNonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use vcissuer_core::{CoreResult, EnvelopeCipher};
use zeroize::Zeroizing;

// AES-256-GCM envelope encryption.
//
// The nonce is randomly generated per encryption and travels with the
// ciphertext. The serialized envelope is compact JSON so it can be stored as
// an opaque blob by the vault.

const NONCE_SIZE: usize = 12;
const ALGORITHM: &str = "A256GCM";

/// Encrypted envelope: algorithm tag, nonce and ciphertext (includes GCM tag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub alg: String,
    pub iv: String,
    pub ciphertext: String,
}

/// Encrypt plaintext using AES-256-GCM with the given key.
pub fn encrypt(key: &Zeroizing<[u8; 32]>, plaintext: &[u8]) -> VaultResult<EncryptedEnvelope> {
    let cipher = Aes256Gcm::new_from_slice(&**key)
        .map_err(|e| VaultError::Encryption(format!("cipher init failed: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = AesNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Encryption(format!("encryption failed: {}", e)))?;

    Ok(EncryptedEnvelope {
        alg: ALGORITHM.to_string(),
        iv: URL_SAFE_NO_PAD.encode(nonce_bytes),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
    })
}

/// Decrypt an envelope using AES-256-GCM with the given key.
pub fn decrypt(key: &Zeroizing<[u8; 32]>, envelope: &EncryptedEnvelope) -> VaultResult<Vec<u8>> {
    if envelope.alg != ALGORITHM {
        return Err(VaultError::Decryption(format!(
            "unsupported envelope algorithm '{}'",
            envelope.alg
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(&**key)
        .map_err(|e| VaultError::Decryption(format!("cipher init failed: {}", e)))?;

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(&envelope.iv)
        .map_err(|e| VaultError::Decryption(format!("invalid nonce encoding: {}", e)))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(VaultError::Decryption(format!(
            "nonce must be {} bytes, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        )));
    }
    let ciphertext = URL_SAFE_NO_PAD
        .decode(&envelope.ciphertext)
        .map_err(|e| VaultError::Decryption(format!("invalid ciphertext encoding: {}", e)))?;

    cipher
        .decrypt(AesNonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|e| VaultError::Decryption(format!("decryption failed: {}", e)))
}

// ---------------------------------------------------------------------------
// AesGcmEnvelopeCipher: EnvelopeCipher over a single deployment key
// ---------------------------------------------------------------------------

pub struct AesGcmEnvelopeCipher {
    key: Zeroizing<[u8; 32]>,
}

impl AesGcmEnvelopeCipher {
    pub fn new(key: Zeroizing<[u8; 32]>) -> Self {
        Self { key }
    }
}

impl EnvelopeCipher for AesGcmEnvelopeCipher {
    fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let env = encrypt(&self.key, plaintext)?;
        Ok(serde_json::to_vec(&env)?)
    }

    fn decrypt(&self, envelope: &[u8]) -> CoreResult<Vec<u8>> {
        let env: EncryptedEnvelope = serde_json::from_slice(envelope)
            .map_err(|e| VaultError::Decryption(format!("malformed envelope: {}", e)))?;
        Ok(decrypt(&self.key, &env)?)
    }
}
