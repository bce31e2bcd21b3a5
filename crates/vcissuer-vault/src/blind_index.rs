use crate::error::{VaultError, VaultResult};
use base64::{engine::general_purpose::URL_SAFE, Engine};
use std::sync::Arc;
use vcissuer_core::{IndexQuery, IndexedAttribute, KeyHandle, LogicalId, MacService};

/// Index family label used for credential IDs.
pub const DEFAULT_INDEX_FAMILY: &str = "vcID";

/// Deterministic keyed index over logical credential IDs.
///
/// `name  = base64url(MAC(family))`
/// `value = base64url(MAC(logical_id))`
///
/// Both are computed under a deployment key held by the MAC service, so the
/// vault can match on the value without learning the ID. The key must be
/// persisted: a fresh key per run would make every stored credential
/// unreachable.
///
/// There is no fallback when the MAC cannot be computed. Writing the plain
/// ID instead would leak it to the vault.
pub struct BlindIndexer {
    mac: Arc<dyn MacService>,
    key: KeyHandle,
    attribute_name: String,
}

impl BlindIndexer {
    pub fn new(mac: Arc<dyn MacService>, key: KeyHandle, family: &str) -> VaultResult<Self> {
        let name_tag = compute(mac.as_ref(), &key, family.as_bytes())?;
        Ok(Self {
            mac,
            key,
            attribute_name: URL_SAFE.encode(name_tag),
        })
    }

    /// Raw MAC over an identifier.
    pub fn index(&self, identifier: &[u8]) -> VaultResult<Vec<u8>> {
        compute(self.mac.as_ref(), &self.key, identifier)
    }

    /// Text form of the index, as stored in the indexed attribute.
    pub fn index_value(&self, logical_id: &LogicalId) -> VaultResult<String> {
        Ok(URL_SAFE.encode(self.index(logical_id.as_str().as_bytes())?))
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    pub fn indexed_attribute(&self, logical_id: &LogicalId) -> VaultResult<IndexedAttribute> {
        Ok(IndexedAttribute {
            name: self.attribute_name.clone(),
            value: self.index_value(logical_id)?,
            unique: true,
        })
    }

    pub fn query(&self, logical_id: &LogicalId) -> VaultResult<IndexQuery> {
        Ok(IndexQuery {
            name: self.attribute_name.clone(),
            value: self.index_value(logical_id)?,
        })
    }
}

fn compute(mac: &dyn MacService, key: &KeyHandle, message: &[u8]) -> VaultResult<Vec<u8>> {
    mac.compute_mac(message, key)
        .map_err(|e| VaultError::CryptoUnavailable(format!("failed to compute blind index: {}", e)))
}
