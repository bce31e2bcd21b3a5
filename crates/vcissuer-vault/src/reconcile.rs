use crate::error::{VaultError, VaultResult, INCONSISTENT_DUPLICATES_MSG};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};
use vcissuer_core::{
    document_id_from_location, DocumentId, EnvelopeCipher, IndexQuery, StructuredDocument,
    VaultGateway, VaultId,
};

/// Resolves a blind-index query to exactly one plaintext payload.
///
/// - no match: `NotFound`
/// - one match: its payload, verbatim
/// - several matches: every document is fetched and decrypted concurrently,
///   then compared byte for byte. Identical payloads are returned as one;
///   any difference is `InconsistentState` and no payload is returned.
///
/// Equality is strict: payloads that differ only in key order or whitespace
/// count as different.
pub struct ConsistencyReconciler {
    gateway: Arc<dyn VaultGateway>,
    cipher: Arc<dyn EnvelopeCipher>,
}

impl ConsistencyReconciler {
    pub fn new(gateway: Arc<dyn VaultGateway>, cipher: Arc<dyn EnvelopeCipher>) -> Self {
        Self { gateway, cipher }
    }

    pub fn resolve(&self, vault: &VaultId, query: &IndexQuery) -> VaultResult<Vec<u8>> {
        let locations = self
            .gateway
            .query_vault(vault, query)
            .map_err(|e| VaultError::upstream("while querying vault", e))?;

        match locations.len() {
            0 => Err(VaultError::NotFound(format!(
                "no credential under profile {} was found with the given id",
                vault
            ))),
            1 => self.open_document(vault, &document_id_from_location(&locations[0])),
            n => {
                warn!(vault = %vault, index = %query.value, matches = n, "multiple documents share one blind index");
                self.reconcile(vault, &locations)
            }
        }
    }

    fn reconcile(&self, vault: &VaultId, locations: &[String]) -> VaultResult<Vec<u8>> {
        let payloads: Vec<VaultResult<Vec<u8>>> = thread::scope(|scope| {
            let handles: Vec<_> = locations
                .iter()
                .map(|location| {
                    let doc_id = document_id_from_location(location);
                    scope.spawn(move || self.open_document(vault, &doc_id))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(VaultError::Internal("document fetch thread panicked".into()))
                    })
                })
                .collect()
        });

        let payloads = payloads.into_iter().collect::<VaultResult<Vec<_>>>()?;
        let (first, rest) = payloads
            .split_first()
            .ok_or_else(|| VaultError::Internal("no payloads to reconcile".into()))?;

        if rest.iter().any(|p| p != first) {
            warn!(vault = %vault, documents = payloads.len(), "duplicate documents disagree");
            return Err(VaultError::InconsistentState(
                INCONSISTENT_DUPLICATES_MSG.to_string(),
            ));
        }
        debug!(vault = %vault, documents = payloads.len(), "duplicate documents are identical");
        Ok(first.clone())
    }

    /// Read, decrypt and unwrap the `message` field of one document.
    pub fn open_document(&self, vault: &VaultId, doc_id: &DocumentId) -> VaultResult<Vec<u8>> {
        let doc = self
            .gateway
            .read_document(vault, doc_id)
            .map_err(|e| VaultError::upstream(format!("while reading document {}", doc_id), e))?;

        let plaintext = self
            .cipher
            .decrypt(&doc.envelope)
            .map_err(|e| VaultError::upstream(format!("while decrypting document {}", doc_id), e))?;

        let structured: StructuredDocument = serde_json::from_slice(&plaintext).map_err(|e| {
            VaultError::Serialization(format!(
                "failed to decode structured document {}: {}",
                doc_id, e
            ))
        })?;

        structured
            .message_bytes()
            .ok_or_else(|| {
                VaultError::InvalidInput(format!("document {} has no message field", doc_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blind_index::{BlindIndexer, DEFAULT_INDEX_FAMILY};
    use crate::builder::EnvelopeBuilder;
    use crate::envelope::AesGcmEnvelopeCipher;
    use crate::gateway::LocalVaultGateway;
    use crate::in_memory_store::MemoryStore;
    use crate::mac::HmacMacService;
    use vcissuer_core::{DataVaultConfig, KeyHandle, LogicalId};
    use zeroize::Zeroizing;

    struct Fixture {
        gateway: Arc<LocalVaultGateway>,
        indexer: Arc<BlindIndexer>,
        builder: EnvelopeBuilder,
        reconciler: ConsistencyReconciler,
        vault: VaultId,
    }

    fn fixture() -> Fixture {
        let gateway = Arc::new(LocalVaultGateway::new(
            Arc::new(MemoryStore::new()),
            "https://edv.example.com",
        ));
        let vault = gateway
            .create_data_vault(&DataVaultConfig {
                reference_id: VaultId::new("profileA"),
            })
            .unwrap();
        let cipher = Arc::new(AesGcmEnvelopeCipher::new(Zeroizing::new([0x33; 32])));
        let mac = Arc::new(HmacMacService::with_key(
            KeyHandle::new("k"),
            Zeroizing::new([0x44; 32]),
        ));
        let indexer =
            Arc::new(BlindIndexer::new(mac, KeyHandle::new("k"), DEFAULT_INDEX_FAMILY).unwrap());
        Fixture {
            builder: EnvelopeBuilder::new(cipher.clone(), indexer.clone()),
            reconciler: ConsistencyReconciler::new(gateway.clone(), cipher),
            gateway,
            indexer,
            vault,
        }
    }

    impl Fixture {
        fn write(&self, content: &str, id: &str) {
            let doc = self.builder.build(content, &LogicalId::new(id)).unwrap();
            self.gateway.create_document(&self.vault, &doc).unwrap();
        }

        fn resolve(&self, id: &str) -> VaultResult<Vec<u8>> {
            let query = self.indexer.query(&LogicalId::new(id)).unwrap();
            self.reconciler.resolve(&self.vault, &query)
        }
    }

    #[test]
    fn test_zero_matches_not_found() {
        let f = fixture();
        let err = f.resolve("vc-1").unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
        assert!(err.to_string().contains("profileA"));
    }

    #[test]
    fn test_single_match_returned_unchanged() {
        let f = fixture();
        let content = r#"{"id":"vc-1", "b":2,"a":1}"#;
        f.write(content, "vc-1");
        assert_eq!(f.resolve("vc-1").unwrap(), content.as_bytes());
    }

    #[test]
    fn test_identical_duplicates_resolve() {
        let f = fixture();
        let content = r#"{"id":"vc-1"}"#;
        f.write(content, "vc-1");
        f.write(content, "vc-1");
        f.write(content, "vc-1");
        assert_eq!(f.resolve("vc-1").unwrap(), content.as_bytes());
    }

    #[test]
    fn test_differing_duplicates_inconsistent() {
        let f = fixture();
        f.write(r#"{"id":"vc-1","v":1}"#, "vc-1");
        f.write(r#"{"id":"vc-1","v":2}"#, "vc-1");
        let err = f.resolve("vc-1").unwrap_err();
        assert!(matches!(err, VaultError::InconsistentState(_)));
        assert!(!err.to_string().contains("\"v\""));
    }

    #[test]
    fn test_reordered_keys_count_as_different() {
        let f = fixture();
        f.write(r#"{"a":1,"b":2}"#, "vc-1");
        f.write(r#"{"b":2,"a":1}"#, "vc-1");
        assert!(matches!(
            f.resolve("vc-1"),
            Err(VaultError::InconsistentState(_))
        ));
    }

    #[test]
    fn test_undecryptable_document_is_upstream_error() {
        let f = fixture();
        let mut doc = f.builder.build("{}", &LogicalId::new("vc-1")).unwrap();
        doc.envelope = b"{\"alg\":\"A256GCM\",\"iv\":\"AAAAAAAAAAAAAAAA\",\"ciphertext\":\"AA\"}".to_vec();
        f.gateway.create_document(&f.vault, &doc).unwrap();
        match f.resolve("vc-1").unwrap_err() {
            VaultError::Upstream { context, .. } => {
                assert!(context.starts_with("while decrypting document"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
