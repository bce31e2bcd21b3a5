use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use subtle::ConstantTimeEq;
use vcissuer_core::{CoreError, CoreResult, RecordId, RecordStore};

type Records = HashMap<RecordId, Vec<u8>>;

/// Process-local `RecordStore`. Nothing survives a restart.
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record IDs starting with `prefix`, sorted (for inspection in tests).
    pub fn record_ids(&self, prefix: &str) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self
            .read()
            .map(|r| {
                r.keys()
                    .filter(|k| k.as_str().starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn read(&self) -> CoreResult<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|e| CoreError::Storage(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> CoreResult<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|e| CoreError::Storage(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, id: &RecordId) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn put(&self, id: &RecordId, value: &[u8]) -> CoreResult<()> {
        self.write()?.insert(id.clone(), value.to_vec());
        Ok(())
    }

    fn put_if_absent(&self, id: &RecordId, value: &[u8]) -> CoreResult<bool> {
        let mut records = self.write()?;
        if records.contains_key(id) {
            return Ok(false);
        }
        records.insert(id.clone(), value.to_vec());
        Ok(true)
    }

    fn compare_and_swap(
        &self,
        id: &RecordId,
        expected: Option<&[u8]>,
        new_value: &[u8],
    ) -> CoreResult<bool> {
        let mut records = self.write()?;
        let matches = match (records.get(id), expected) {
            (None, None) => true,
            (Some(current), Some(exp)) => current.as_slice().ct_eq(exp).into(),
            _ => false,
        };
        if matches {
            records.insert(id.clone(), new_value.to_vec());
        }
        Ok(matches)
    }

    fn delete(&self, id: &RecordId) -> CoreResult<bool> {
        Ok(self.write()?.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_delete() {
        let store = MemoryStore::new();
        let id = RecordId::new("status/cursor");
        assert!(store.get(&id).unwrap().is_none());
        store.put(&id, b"one").unwrap();
        store.put(&id, b"two").unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap(), b"two");
        assert_eq!(store.len(), 1);
        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_if_absent_keeps_first_value() {
        let store = MemoryStore::new();
        let id = RecordId::new("deployment/root-key");
        assert!(store.put_if_absent(&id, b"first").unwrap());
        assert!(!store.put_if_absent(&id, b"second").unwrap());
        assert_eq!(store.get(&id).unwrap().unwrap(), b"first");
    }

    #[test]
    fn test_compare_and_swap() {
        let store = MemoryStore::new();
        let id = RecordId::new("edv/index/a/b/c");
        assert!(store.compare_and_swap(&id, None, b"v1").unwrap());
        assert!(!store.compare_and_swap(&id, None, b"v2").unwrap());
        assert!(!store.compare_and_swap(&id, Some(&b"stale"[..]), b"v2").unwrap());
        assert!(store.compare_and_swap(&id, Some(&b"v1"[..]), b"v2").unwrap());
        assert_eq!(store.get(&id).unwrap().unwrap(), b"v2");
    }

    #[test]
    fn test_record_ids_by_prefix() {
        let store = MemoryStore::new();
        store.put(&RecordId::new("edv/doc/b"), b"").unwrap();
        store.put(&RecordId::new("edv/doc/a"), b"").unwrap();
        store.put(&RecordId::new("status/shard/1"), b"").unwrap();
        assert_eq!(
            store.record_ids("edv/doc/"),
            vec![RecordId::new("edv/doc/a"), RecordId::new("edv/doc/b")]
        );
    }
}
