use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::BTreeMap;

use crate::types::{DocumentId, VaultId};

/// Content field holding the credential payload, stored verbatim.
pub const MESSAGE_FIELD: &str = "message";

// ---------------------------------------------------------------------------
// StructuredDocument: plaintext side of an encrypted document
// ---------------------------------------------------------------------------

/// Plaintext document that gets sealed into an envelope.
///
/// Content values are kept as raw JSON so the credential payload comes back
/// byte-for-byte as it was stored (no re-serialization, no key reordering).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub id: DocumentId,
    pub content: BTreeMap<String, Box<RawValue>>,
    #[serde(default, skip_serializing_if = "MessagePadding::is_empty")]
    pub padding: MessagePadding,
}

/// Whitespace around the `message` payload. A raw JSON value never includes
/// it, so it is kept beside the value and put back on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePadding {
    #[serde(default)]
    pub leading: String,
    #[serde(default)]
    pub trailing: String,
}

impl MessagePadding {
    pub fn is_empty(&self) -> bool {
        self.leading.is_empty() && self.trailing.is_empty()
    }
}

const JSON_WHITESPACE: [char; 4] = [' ', '\t', '\n', '\r'];

impl StructuredDocument {
    /// Wrap a JSON text under the `message` field. Fails when `text` is not
    /// a single JSON value.
    pub fn with_message(id: DocumentId, text: &str) -> serde_json::Result<Self> {
        let value = text.trim_matches(&JSON_WHITESPACE[..]);
        let start = text.len() - text.trim_start_matches(&JSON_WHITESPACE[..]).len();
        let padding = MessagePadding {
            leading: text[..start].to_string(),
            trailing: text[start + value.len()..].to_string(),
        };

        let mut content = BTreeMap::new();
        content.insert(
            MESSAGE_FIELD.to_string(),
            RawValue::from_string(value.to_string())?,
        );
        Ok(Self {
            id,
            content,
            padding,
        })
    }

    /// The `message` payload exactly as it was given to `with_message`.
    pub fn message_bytes(&self) -> Option<Vec<u8>> {
        self.content.get(MESSAGE_FIELD).map(|raw| {
            [
                self.padding.leading.as_bytes(),
                raw.get().as_bytes(),
                self.padding.trailing.as_bytes(),
            ]
            .concat()
        })
    }
}

// ---------------------------------------------------------------------------
// Indexed attributes: what the vault is allowed to see
// ---------------------------------------------------------------------------

/// A blind-indexed attribute. The vault can match on `value` but never
/// learns the identifier it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedAttribute {
    pub name: String,
    pub value: String,
    /// Best-effort uniqueness hint for the vault; not relied on by readers.
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedAttributeCollection {
    pub sequence: u64,
    pub indexed_attributes: Vec<IndexedAttribute>,
}

/// Immutable document as written to the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedDocument {
    pub id: DocumentId,
    pub sequence: u64,
    #[serde(with = "hex_bytes")]
    pub envelope: Vec<u8>,
    pub indexed: Vec<IndexedAttributeCollection>,
}

impl EncryptedDocument {
    /// Iterate every indexed attribute across all collections.
    pub fn indexed_attributes(&self) -> impl Iterator<Item = &IndexedAttribute> {
        self.indexed
            .iter()
            .flat_map(|c| c.indexed_attributes.iter())
    }
}

/// Exact-match query on one indexed attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexQuery {
    pub name: String,
    pub value: String,
}

impl IndexQuery {
    pub fn matches(&self, attr: &IndexedAttribute) -> bool {
        attr.name == self.name && attr.value == self.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataVaultConfig {
    pub reference_id: VaultId,
}

/// Extract the document ID from a document location URL (last path segment).
pub fn document_id_from_location(location: &str) -> DocumentId {
    let last = location.rsplit('/').next().unwrap_or(location);
    DocumentId::new(last)
}

mod hex_bytes {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
