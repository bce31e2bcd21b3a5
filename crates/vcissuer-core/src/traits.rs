use crate::document::{DataVaultConfig, EncryptedDocument, IndexQuery};
use crate::error::CoreResult;
use crate::types::{DocumentId, KeyHandle, RecordId, VaultId};

// ---------------------------------------------------------------------------
// RecordStore: local key/value persistence
//
// Backs the status-list shards, the allocator cursor, profiles, deployment
// key material and the reference vault gateway.
// ---------------------------------------------------------------------------

pub trait RecordStore: Send + Sync {
    fn get(&self, id: &RecordId) -> CoreResult<Option<Vec<u8>>>;
    fn put(&self, id: &RecordId, value: &[u8]) -> CoreResult<()>;

    /// Write only if no value exists. Returns false when the record was
    /// already present (the stored value is left untouched).
    fn put_if_absent(&self, id: &RecordId, value: &[u8]) -> CoreResult<bool>;

    /// Atomic compare-and-swap. Returns true if the swap happened.
    fn compare_and_swap(
        &self,
        id: &RecordId,
        expected: Option<&[u8]>,
        new_value: &[u8],
    ) -> CoreResult<bool>;

    fn delete(&self, id: &RecordId) -> CoreResult<bool>;
}

// ---------------------------------------------------------------------------
// EnvelopeCipher: authenticated encryption of whole documents
// ---------------------------------------------------------------------------

pub trait EnvelopeCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>>;
    fn decrypt(&self, envelope: &[u8]) -> CoreResult<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// MacService: keyed pseudorandom function for blind indexing
// ---------------------------------------------------------------------------

pub trait MacService: Send + Sync {
    fn compute_mac(&self, message: &[u8], key: &KeyHandle) -> CoreResult<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// VaultGateway: the remote encrypted-document store
//
// May be eventually consistent: a query can return more than one location
// for a value declared unique.
// ---------------------------------------------------------------------------

pub trait VaultGateway: Send + Sync {
    fn create_data_vault(&self, config: &DataVaultConfig) -> CoreResult<VaultId>;

    /// Returns the location (URL) of the new document.
    /// Fails with `CoreError::VaultNotFound` when the vault does not exist.
    fn create_document(&self, vault: &VaultId, doc: &EncryptedDocument) -> CoreResult<String>;

    fn read_document(&self, vault: &VaultId, doc_id: &DocumentId) -> CoreResult<EncryptedDocument>;

    /// Returns the locations of every document matching the query.
    fn query_vault(&self, vault: &VaultId, query: &IndexQuery) -> CoreResult<Vec<String>>;
}
