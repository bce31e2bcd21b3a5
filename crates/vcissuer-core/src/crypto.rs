use crate::types::DocumentId;
use rand::RngCore;

/// Number of random bytes behind a document identifier.
pub const DOCUMENT_ID_BYTES: usize = 16;

/// Generate a fresh vault-compatible document identifier.
///
/// Formula: Base58(16 random bytes). The Base58 alphabet has no `/`, `+`
/// or `=`, so the result is safe as a vault path segment.
pub fn generate_document_id() -> DocumentId {
    let mut bytes = [0u8; DOCUMENT_ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    DocumentId(bs58::encode(bytes).into_string())
}
