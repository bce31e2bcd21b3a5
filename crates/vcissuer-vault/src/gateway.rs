use std::sync::Arc;
use tracing::{debug, info};
use vcissuer_core::{
    CoreError, CoreResult, DataVaultConfig, DocumentId, EncryptedDocument, IndexQuery,
    IndexedAttribute, RecordId, RecordStore, VaultGateway, VaultId,
};

const CAS_ATTEMPTS: usize = 16;

// ---------------------------------------------------------------------------
// LocalVaultGateway: encrypted document vault over a RecordStore
//
// Record layout:
//   edv/vault/{vault}                 DataVaultConfig (JSON)
//   edv/doc/{vault}/{doc}             EncryptedDocument (JSON)
//   edv/index/{vault}/{name}/{value}  [DocumentId] (JSON), append-only
//
// The gateway only ever sees envelopes and blind-index values. Its store
// stands in for the remote vault and must not also hold the deployment root
// key. Unique attributes are not enforced unless asked for, which reproduces the
// duplicate-accepted-write behaviour of an eventually consistent vault.
// ---------------------------------------------------------------------------

pub struct LocalVaultGateway {
    store: Arc<dyn RecordStore>,
    base_url: String,
    enforce_unique: bool,
}

impl LocalVaultGateway {
    pub fn new(store: Arc<dyn RecordStore>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            enforce_unique: false,
        }
    }

    /// Reject a document whose unique attribute value is already taken.
    pub fn with_unique_enforcement(mut self) -> Self {
        self.enforce_unique = true;
        self
    }

    pub fn document_location(&self, vault: &VaultId, doc_id: &DocumentId) -> String {
        format!(
            "{}/encrypted-data-vaults/{}/documents/{}",
            self.base_url, vault, doc_id
        )
    }

    fn vault_exists(&self, vault: &VaultId) -> CoreResult<bool> {
        Ok(self.store.get(&vault_record(vault))?.is_some())
    }

    fn require_vault(&self, vault: &VaultId) -> CoreResult<()> {
        if self.vault_exists(vault)? {
            Ok(())
        } else {
            Err(CoreError::VaultNotFound(vault.to_string()))
        }
    }

    fn index_entries(&self, vault: &VaultId, name: &str, value: &str) -> CoreResult<Vec<DocumentId>> {
        match self.store.get(&index_record(vault, name, value))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Append a document ID to an index bucket with a bounded CAS loop.
    fn append_to_index(
        &self,
        vault: &VaultId,
        attr: &IndexedAttribute,
        doc_id: &DocumentId,
    ) -> CoreResult<()> {
        let record = index_record(vault, &attr.name, &attr.value);
        for _ in 0..CAS_ATTEMPTS {
            let current = self.store.get(&record)?;
            let mut ids: Vec<DocumentId> = match &current {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => Vec::new(),
            };
            ids.push(doc_id.clone());
            let updated = serde_json::to_vec(&ids)?;
            if self
                .store
                .compare_and_swap(&record, current.as_deref(), &updated)?
            {
                return Ok(());
            }
        }
        Err(CoreError::Storage(format!(
            "index update for document {} lost {} consecutive races",
            doc_id, CAS_ATTEMPTS
        )))
    }
}

impl VaultGateway for LocalVaultGateway {
    fn create_data_vault(&self, config: &DataVaultConfig) -> CoreResult<VaultId> {
        let vault = config.reference_id.clone();
        if vault.is_empty() {
            return Err(CoreError::Vault("vault reference ID is empty".into()));
        }
        let inserted = self
            .store
            .put_if_absent(&vault_record(&vault), &serde_json::to_vec(config)?)?;
        if !inserted {
            return Err(CoreError::VaultExists(vault.to_string()));
        }
        info!(vault = %vault, "created data vault");
        Ok(vault)
    }

    fn create_document(&self, vault: &VaultId, doc: &EncryptedDocument) -> CoreResult<String> {
        self.require_vault(vault)?;

        if self.enforce_unique {
            for attr in doc.indexed_attributes().filter(|a| a.unique) {
                if !self.index_entries(vault, &attr.name, &attr.value)?.is_empty() {
                    return Err(CoreError::Vault(format!(
                        "unique attribute value already present in vault {}",
                        vault
                    )));
                }
            }
        }

        let inserted = self
            .store
            .put_if_absent(&doc_record(vault, &doc.id), &serde_json::to_vec(doc)?)?;
        if !inserted {
            return Err(CoreError::Vault(format!(
                "document {} already exists in vault {}",
                doc.id, vault
            )));
        }
        for attr in doc.indexed_attributes() {
            self.append_to_index(vault, attr, &doc.id)?;
        }

        debug!(vault = %vault, doc = %doc.id, "stored encrypted document");
        Ok(self.document_location(vault, &doc.id))
    }

    fn read_document(&self, vault: &VaultId, doc_id: &DocumentId) -> CoreResult<EncryptedDocument> {
        self.require_vault(vault)?;
        match self.store.get(&doc_record(vault, doc_id))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(CoreError::DocumentNotFound(format!(
                "{} in vault {}",
                doc_id, vault
            ))),
        }
    }

    fn query_vault(&self, vault: &VaultId, query: &IndexQuery) -> CoreResult<Vec<String>> {
        self.require_vault(vault)?;
        let ids = self.index_entries(vault, &query.name, &query.value)?;
        debug!(vault = %vault, index = %query.value, matches = ids.len(), "queried vault");
        Ok(ids
            .iter()
            .map(|id| self.document_location(vault, id))
            .collect())
    }
}

fn vault_record(vault: &VaultId) -> RecordId {
    RecordId::new(format!("edv/vault/{}", vault))
}

fn doc_record(vault: &VaultId, doc_id: &DocumentId) -> RecordId {
    RecordId::new(format!("edv/doc/{}/{}", vault, doc_id))
}

fn index_record(vault: &VaultId, name: &str, value: &str) -> RecordId {
    RecordId::new(format!("edv/index/{}/{}/{}", vault, name, value))
}
