use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::RwLock;
use vcissuer_core::{CoreError, CoreResult, KeyHandle, MacService};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 MAC service. Keys are registered under a handle and never
/// handed back out.
pub struct HmacMacService {
    keys: RwLock<HashMap<KeyHandle, Zeroizing<[u8; 32]>>>,
}

impl HmacMacService {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Convenience constructor for a service holding a single key.
    pub fn with_key(handle: KeyHandle, key: Zeroizing<[u8; 32]>) -> Self {
        let mut keys = HashMap::new();
        keys.insert(handle, key);
        Self {
            keys: RwLock::new(keys),
        }
    }

    pub fn register(&self, handle: KeyHandle, key: Zeroizing<[u8; 32]>) -> CoreResult<()> {
        let mut keys = self
            .keys
            .write()
            .map_err(|e| CoreError::Internal(format!("key registry poisoned: {}", e)))?;
        keys.insert(handle, key);
        Ok(())
    }
}

impl Default for HmacMacService {
    fn default() -> Self {
        Self::new()
    }
}

impl MacService for HmacMacService {
    fn compute_mac(&self, message: &[u8], key: &KeyHandle) -> CoreResult<Vec<u8>> {
        let keys = self
            .keys
            .read()
            .map_err(|e| CoreError::Internal(format!("key registry poisoned: {}", e)))?;
        let key_bytes = keys
            .get(key)
            .ok_or_else(|| CoreError::Crypto(format!("unknown key handle '{}'", key)))?;

        let mut mac = HmacSha256::new_from_slice(&**key_bytes)
            .map_err(|e| CoreError::Crypto(format!("HMAC init failed: {}", e)))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> HmacMacService {
        HmacMacService::with_key(KeyHandle::new("k1"), Zeroizing::new([0x11; 32]))
    }

    #[test]
    fn test_mac_deterministic() {
        let svc = service();
        let a = svc.compute_mac(b"vc-1", &KeyHandle::new("k1")).unwrap();
        let b = svc.compute_mac(b"vc-1", &KeyHandle::new("k1")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_mac_differs_by_message_and_key() {
        let svc = service();
        svc.register(KeyHandle::new("k2"), Zeroizing::new([0x22; 32]))
            .unwrap();
        let a = svc.compute_mac(b"vc-1", &KeyHandle::new("k1")).unwrap();
        let b = svc.compute_mac(b"vc-2", &KeyHandle::new("k1")).unwrap();
        let c = svc.compute_mac(b"vc-1", &KeyHandle::new("k2")).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_unknown_handle_is_crypto_error() {
        let svc = service();
        let err = svc
            .compute_mac(b"vc-1", &KeyHandle::new("missing"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Crypto(_)));
    }
}
