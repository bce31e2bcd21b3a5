use crate::blind_index::BlindIndexer;
use crate::error::{VaultError, VaultResult};
use std::sync::Arc;
use tracing::debug;
use vcissuer_core::{
    generate_document_id, EncryptedDocument, EnvelopeCipher, IndexedAttributeCollection,
    LogicalId, StructuredDocument,
};

/// Seals credential content into an `EncryptedDocument`.
///
/// Each call draws a fresh document ID, so two builds of the same content
/// share nothing observable except the blind-index value. Failures are not
/// retried here: a retry would mint another document ID and write a
/// duplicate.
pub struct EnvelopeBuilder {
    cipher: Arc<dyn EnvelopeCipher>,
    indexer: Arc<BlindIndexer>,
}

impl EnvelopeBuilder {
    pub fn new(cipher: Arc<dyn EnvelopeCipher>, indexer: Arc<BlindIndexer>) -> Self {
        Self { cipher, indexer }
    }

    /// Build the document for `content` (a JSON text, kept verbatim
    /// including surrounding whitespace).
    pub fn build(&self, content: &str, logical_id: &LogicalId) -> VaultResult<EncryptedDocument> {
        let id = generate_document_id();
        let structured = StructuredDocument::with_message(id.clone(), content)
            .map_err(|e| VaultError::InvalidInput(format!("content is not valid JSON: {}", e)))?;
        let plaintext = serde_json::to_vec(&structured).map_err(|e| {
            VaultError::Serialization(format!("failed to marshal structured document: {}", e))
        })?;

        let envelope = self
            .cipher
            .encrypt(&plaintext)
            .map_err(|e| VaultError::upstream("while encrypting document", e))?;

        let attribute = self.indexer.indexed_attribute(logical_id)?;
        debug!(doc = %id, index = %attribute.value, "built encrypted document");

        Ok(EncryptedDocument {
            id,
            sequence: 0,
            envelope,
            indexed: vec![IndexedAttributeCollection {
                sequence: 0,
                indexed_attributes: vec![attribute],
            }],
        })
    }
}
