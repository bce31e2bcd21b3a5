use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use subtle::ConstantTimeEq;
use vcissuer_core::{CoreError, CoreResult, RecordId, RecordStore};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed `RecordStore`.
///
/// A single `records` table keyed by record ID. Values are opaque blobs:
/// envelopes, blind-index buckets and status shards. Several processes may
/// open the same file; compare-and-swap runs in an immediate transaction so
/// it stays atomic across them.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: &str) -> CoreResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| CoreError::Storage(format!("failed to open database: {}", e)))?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| CoreError::Storage(format!("failed to set busy timeout: {}", e)))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                updated_at TEXT DEFAULT (datetime('now'))
            );",
        )
        .map_err(|e| CoreError::Storage(format!("failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database (for testing).
    pub fn in_memory() -> CoreResult<Self> {
        Self::open(":memory:")
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CoreError::Storage(format!("lock poisoned: {}", e)))
    }
}

fn select(conn: &Connection, id: &RecordId) -> CoreResult<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT value FROM records WHERE id = ?1",
        params![id.as_str()],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| CoreError::Storage(format!("query failed: {}", e)))
}

fn upsert(conn: &Connection, id: &RecordId, value: &[u8]) -> CoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO records (id, value, updated_at) VALUES (?1, ?2, datetime('now'))",
        params![id.as_str(), value],
    )
    .map_err(|e| CoreError::Storage(format!("insert failed: {}", e)))?;
    Ok(())
}

impl RecordStore for SqliteStore {
    fn get(&self, id: &RecordId) -> CoreResult<Option<Vec<u8>>> {
        let conn = self.lock()?;
        select(&conn, id)
    }

    fn put(&self, id: &RecordId, value: &[u8]) -> CoreResult<()> {
        let conn = self.lock()?;
        upsert(&conn, id, value)
    }

    fn put_if_absent(&self, id: &RecordId, value: &[u8]) -> CoreResult<bool> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO records (id, value) VALUES (?1, ?2)",
                params![id.as_str(), value],
            )
            .map_err(|e| CoreError::Storage(format!("insert failed: {}", e)))?;
        Ok(rows > 0)
    }

    fn compare_and_swap(
        &self,
        id: &RecordId,
        expected: Option<&[u8]>,
        new_value: &[u8],
    ) -> CoreResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| CoreError::Storage(format!("failed to begin transaction: {}", e)))?;
        let current = select(&tx, id)?;
        let matches = match (current.as_deref(), expected) {
            (None, None) => true,
            (Some(curr), Some(exp)) => curr.ct_eq(exp).into(),
            _ => false,
        };
        if matches {
            upsert(&tx, id, new_value)?;
        }
        tx.commit()
            .map_err(|e| CoreError::Storage(format!("commit failed: {}", e)))?;
        Ok(matches)
    }

    fn delete(&self, id: &RecordId) -> CoreResult<bool> {
        let rows = self
            .lock()?
            .execute("DELETE FROM records WHERE id = ?1", params![id.as_str()])
            .map_err(|e| CoreError::Storage(format!("delete failed: {}", e)))?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_get_put_delete() {
        let store = SqliteStore::in_memory().unwrap();
        let id = RecordId::new("status/shard/1");
        assert!(store.get(&id).unwrap().is_none());
        store.put(&id, b"shard").unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap(), b"shard");
        assert!(store.delete(&id).unwrap());
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_sqlite_put_if_absent() {
        let store = SqliteStore::in_memory().unwrap();
        let id = RecordId::new("deployment/root-key");
        assert!(store.put_if_absent(&id, b"first").unwrap());
        assert!(!store.put_if_absent(&id, b"second").unwrap());
        assert_eq!(store.get(&id).unwrap().unwrap(), b"first");
    }

    #[test]
    fn test_sqlite_cas() {
        let store = SqliteStore::in_memory().unwrap();
        let id = RecordId::new("cursor");
        assert!(store.compare_and_swap(&id, None, b"1").unwrap());
        assert!(!store.compare_and_swap(&id, None, b"2").unwrap());
        assert!(store.compare_and_swap(&id, Some(&b"1"[..]), b"2").unwrap());
        assert_eq!(store.get(&id).unwrap().unwrap(), b"2");
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!(
            "vcissuer-sqlite-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("records.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteStore::open(path).unwrap();
            store.put(&RecordId::new("k"), b"v").unwrap();
        }
        let store = SqliteStore::open(path).unwrap();
        assert_eq!(store.get(&RecordId::new("k")).unwrap().unwrap(), b"v");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_sqlite_cas_across_connections() {
        let dir = std::env::temp_dir().join(format!(
            "vcissuer-sqlite-cas-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("records.db");
        let path = path.to_str().unwrap();

        let first = SqliteStore::open(path).unwrap();
        let second = SqliteStore::open(path).unwrap();
        let id = RecordId::new("status/shard/1");
        first.put(&id, b"fill=0").unwrap();

        // Both connections read fill=0; only one claim may land.
        let seen = second.get(&id).unwrap().unwrap();
        assert!(first.compare_and_swap(&id, Some(&seen[..]), b"fill=1").unwrap());
        assert!(!second.compare_and_swap(&id, Some(&seen[..]), b"fill=1").unwrap());
        assert_eq!(second.get(&id).unwrap().unwrap(), b"fill=1");

        drop(first);
        drop(second);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
