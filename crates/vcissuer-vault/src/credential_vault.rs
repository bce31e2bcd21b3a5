use crate::blind_index::BlindIndexer;
use crate::builder::EnvelopeBuilder;
use crate::error::{VaultError, VaultResult};
use crate::reconcile::ConsistencyReconciler;
use std::sync::Arc;
use tracing::{info, warn};
use vcissuer_core::{
    CoreError, DataVaultConfig, EncryptedDocument, EnvelopeCipher, LogicalId, VaultGateway,
    VaultId,
};

/// Store and retrieve credentials by logical ID.
///
/// One vault per issuer profile. Writes create the vault lazily: if the
/// first write fails because the vault is missing, the vault is created and
/// the write is attempted exactly once more. No other error is retried.
pub struct CredentialVault {
    gateway: Arc<dyn VaultGateway>,
    builder: EnvelopeBuilder,
    indexer: Arc<BlindIndexer>,
    reconciler: ConsistencyReconciler,
}

impl CredentialVault {
    pub fn new(
        gateway: Arc<dyn VaultGateway>,
        cipher: Arc<dyn EnvelopeCipher>,
        indexer: Arc<BlindIndexer>,
    ) -> Self {
        Self {
            builder: EnvelopeBuilder::new(cipher.clone(), indexer.clone()),
            reconciler: ConsistencyReconciler::new(gateway.clone(), cipher),
            gateway,
            indexer,
        }
    }

    /// Seal `content` and write it under `logical_id`. Returns the document
    /// location.
    pub fn store_credential(
        &self,
        content: &str,
        logical_id: &LogicalId,
        vault: &VaultId,
    ) -> VaultResult<String> {
        validate_request(logical_id, vault)?;
        let doc = self.builder.build(content, logical_id)?;
        self.write_document(vault, &doc)
    }

    /// Fetch the payload stored under `logical_id`, byte for byte.
    pub fn retrieve_credential(
        &self,
        logical_id: &LogicalId,
        vault: &VaultId,
    ) -> VaultResult<Vec<u8>> {
        validate_request(logical_id, vault)?;
        let query = self.indexer.query(logical_id)?;
        self.reconciler.resolve(vault, &query)
    }

    fn write_document(&self, vault: &VaultId, doc: &EncryptedDocument) -> VaultResult<String> {
        match self.gateway.create_document(vault, doc) {
            Ok(location) => Ok(location),
            Err(e) if e.is_vault_not_found() => {
                self.create_vault(vault)?;
                self.gateway
                    .create_document(vault, doc)
                    .map_err(|e| VaultError::upstream("while storing document", e))
            }
            Err(e) => Err(VaultError::upstream("while storing document", e)),
        }
    }

    fn create_vault(&self, vault: &VaultId) -> VaultResult<()> {
        let config = DataVaultConfig {
            reference_id: vault.clone(),
        };
        match self.gateway.create_data_vault(&config) {
            Ok(_) => {
                info!(vault = %vault, "created missing vault before first write");
                Ok(())
            }
            // Another writer created it between our write and now.
            Err(CoreError::VaultExists(_)) => {
                warn!(vault = %vault, "vault appeared concurrently");
                Ok(())
            }
            Err(e) => Err(VaultError::upstream("while creating vault", e)),
        }
    }
}

fn validate_request(logical_id: &LogicalId, vault: &VaultId) -> VaultResult<()> {
    if vault.is_empty() {
        return Err(VaultError::InvalidInput("missing profile name".into()));
    }
    if logical_id.is_empty() {
        return Err(VaultError::InvalidInput(
            "missing verifiable credential ID".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blind_index::DEFAULT_INDEX_FAMILY;
    use crate::envelope::AesGcmEnvelopeCipher;
    use crate::gateway::LocalVaultGateway;
    use crate::in_memory_store::MemoryStore;
    use crate::mac::HmacMacService;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vcissuer_core::{CoreResult, DocumentId, IndexQuery, KeyHandle};
    use zeroize::Zeroizing;

    fn indexer() -> Arc<BlindIndexer> {
        let mac = Arc::new(HmacMacService::with_key(
            KeyHandle::new("k"),
            Zeroizing::new([0x61; 32]),
        ));
        Arc::new(BlindIndexer::new(mac, KeyHandle::new("k"), DEFAULT_INDEX_FAMILY).unwrap())
    }

    fn vault_over(gateway: Arc<dyn VaultGateway>) -> CredentialVault {
        let cipher = Arc::new(AesGcmEnvelopeCipher::new(Zeroizing::new([0x62; 32])));
        CredentialVault::new(gateway, cipher, indexer())
    }

    fn local_vault() -> CredentialVault {
        vault_over(Arc::new(LocalVaultGateway::new(
            Arc::new(MemoryStore::new()),
            "https://edv.example.com",
        )))
    }

    /// Gateway that counts calls and fails document writes a fixed number of
    /// times with the given error.
    struct FlakyGateway {
        inner: LocalVaultGateway,
        write_failures: AtomicUsize,
        failure: fn() -> CoreError,
        writes: AtomicUsize,
        vault_creations: AtomicUsize,
    }

    impl FlakyGateway {
        fn new(write_failures: usize, failure: fn() -> CoreError) -> Self {
            Self {
                inner: LocalVaultGateway::new(Arc::new(MemoryStore::new()), "https://edv"),
                write_failures: AtomicUsize::new(write_failures),
                failure,
                writes: AtomicUsize::new(0),
                vault_creations: AtomicUsize::new(0),
            }
        }
    }

    impl VaultGateway for FlakyGateway {
        fn create_data_vault(&self, config: &DataVaultConfig) -> CoreResult<VaultId> {
            self.vault_creations.fetch_add(1, Ordering::SeqCst);
            self.inner.create_data_vault(config)
        }

        fn create_document(&self, vault: &VaultId, doc: &EncryptedDocument) -> CoreResult<String> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let remaining = self.write_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.write_failures.store(remaining - 1, Ordering::SeqCst);
                return Err((self.failure)());
            }
            self.inner.create_document(vault, doc)
        }

        fn read_document(&self, vault: &VaultId, doc_id: &DocumentId) -> CoreResult<EncryptedDocument> {
            self.inner.read_document(vault, doc_id)
        }

        fn query_vault(&self, vault: &VaultId, query: &IndexQuery) -> CoreResult<Vec<String>> {
            self.inner.query_vault(vault, query)
        }
    }

    #[test]
    fn test_store_then_retrieve_byte_identical() {
        let cv = local_vault();
        let content = r#"{"id":"vc-1","credentialSubject":{"name":"Zoë"}}"#;
        let vault = VaultId::new("profileA");
        let location = cv
            .store_credential(content, &LogicalId::new("vc-1"), &vault)
            .unwrap();
        assert!(location.contains("/encrypted-data-vaults/profileA/documents/"));
        assert_eq!(
            cv.retrieve_credential(&LogicalId::new("vc-1"), &vault)
                .unwrap(),
            content.as_bytes()
        );
    }

    #[test]
    fn test_missing_names_rejected() {
        let cv = local_vault();
        let err = cv
            .store_credential("{}", &LogicalId::new("vc-1"), &VaultId::new(""))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid input: missing profile name");
        let err = cv
            .retrieve_credential(&LogicalId::new(""), &VaultId::new("profileA"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid input: missing verifiable credential ID"
        );
    }

    #[test]
    fn test_lazy_vault_creation_retries_once() {
        let gateway = Arc::new(FlakyGateway::new(0, || CoreError::Internal("unused".into())));
        let cv = vault_over(gateway.clone());
        cv.store_credential("{}", &LogicalId::new("vc-1"), &VaultId::new("fresh"))
            .unwrap();
        assert_eq!(gateway.writes.load(Ordering::SeqCst), 2);
        assert_eq!(gateway.vault_creations.load(Ordering::SeqCst), 1);

        // Vault now exists: no further creation.
        cv.store_credential("{}", &LogicalId::new("vc-2"), &VaultId::new("fresh"))
            .unwrap();
        assert_eq!(gateway.writes.load(Ordering::SeqCst), 3);
        assert_eq!(gateway.vault_creations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_vault_not_found_is_not_retried_again() {
        let gateway = Arc::new(FlakyGateway::new(2, || CoreError::VaultNotFound("x".into())));
        let cv = vault_over(gateway.clone());
        let err = cv
            .store_credential("{}", &LogicalId::new("vc-1"), &VaultId::new("fresh"))
            .unwrap_err();
        assert!(matches!(err, VaultError::Upstream { .. }));
        assert_eq!(gateway.writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_other_write_errors_not_retried() {
        let gateway = Arc::new(FlakyGateway::new(1, || CoreError::Vault("503".into())));
        let cv = vault_over(gateway.clone());
        let err = cv
            .store_credential("{}", &LogicalId::new("vc-1"), &VaultId::new("fresh"))
            .unwrap_err();
        assert!(err.to_string().starts_with("while storing document"));
        assert_eq!(gateway.writes.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.vault_creations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retrieve_unknown_vault_is_upstream() {
        let cv = local_vault();
        let err = cv
            .retrieve_credential(&LogicalId::new("vc-1"), &VaultId::new("nobody"))
            .unwrap_err();
        assert!(matches!(err, VaultError::Upstream { .. }));
    }
}
