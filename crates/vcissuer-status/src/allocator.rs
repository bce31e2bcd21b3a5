use crate::csl::{SlotRef, SlotState, StatusListShard, StatusSlot};
use crate::error::{StatusError, StatusResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use vcissuer_core::{RecordId, RecordStore};

const CURSOR_RECORD: &str = "status/cursor";
const CAS_ATTEMPTS: usize = 32;

/// Slot allocation as seen by issuance.
pub trait SlotAllocator: Send + Sync {
    fn allocate(&self) -> StatusResult<StatusSlot>;
    fn update(&self, slot: &SlotRef, status: &str, reason: &str) -> StatusResult<()>;
}

/// Persisted allocator state. The fill count is not stored here: it is the
/// length of the current shard's slot list.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CursorRecord {
    capacity: u32,
    shard_number: u64,
}

/// Last allocation target this process has seen. Other allocators over the
/// same store may have moved past it.
struct Cursor {
    shard_number: u64,
}

// ---------------------------------------------------------------------------
// StatusListAllocator
//
// Shards are addressed as `<base_url>/<n>` with n = 1, 2, ... and stored as
// `status/shard/<n>`. A claim is a compare-and-swap of the shard record
// against the bytes it was read from, so allocators in separate processes
// sharing one store never hand out the same slot. The mutex only keeps
// threads of this process from racing each other into retries.
// ---------------------------------------------------------------------------

pub struct StatusListAllocator {
    store: Arc<dyn RecordStore>,
    base_url: String,
    capacity: u32,
    cursor: Mutex<Cursor>,
}

impl StatusListAllocator {
    /// Open the allocator over `store`, creating the first shard on first use.
    ///
    /// `capacity` must match the capacity the deployment was started with.
    pub fn open(
        store: Arc<dyn RecordStore>,
        base_url: impl Into<String>,
        capacity: u32,
    ) -> StatusResult<Self> {
        if capacity == 0 {
            return Err(StatusError::Config(
                "status list capacity must be greater than zero".into(),
            ));
        }
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let cursor_id = RecordId::new(CURSOR_RECORD);
        let record = match read_cursor(store.as_ref())? {
            Some((_, record)) => record,
            None => {
                let shard = StatusListShard::new(shard_url(&base_url, 1), capacity);
                store.put_if_absent(&shard_record(1), &serde_json::to_vec(&shard)?)?;
                let first = CursorRecord {
                    capacity,
                    shard_number: 1,
                };
                if store.put_if_absent(&cursor_id, &serde_json::to_vec(&first)?)? {
                    info!(shard = %shard.id, capacity, "initialized status lists");
                    first
                } else {
                    // Another opener got there first.
                    read_cursor(store.as_ref())?
                        .map(|(_, record)| record)
                        .ok_or_else(cursor_missing)?
                }
            }
        };

        if record.capacity != capacity {
            return Err(StatusError::Config(format!(
                "configured status list capacity {} differs from deployed capacity {}",
                capacity, record.capacity
            )));
        }

        let allocator = Self {
            store,
            base_url,
            capacity,
            cursor: Mutex::new(Cursor {
                shard_number: record.shard_number,
            }),
        };
        allocator.read_shard(record.shard_number)?;
        Ok(allocator)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Claim the next free slot, starting a new shard when the current one
    /// is full.
    pub fn allocate(&self) -> StatusResult<StatusSlot> {
        let mut cursor = self.lock()?;

        for _ in 0..CAS_ATTEMPTS {
            let (current, mut shard) = self.read_shard(cursor.shard_number)?;
            if shard.is_full() {
                self.advance(&mut cursor)?;
                continue;
            }

            let index = shard.fill();
            shard.slots.push(SlotState::default());
            if self.store.compare_and_swap(
                &shard_record(cursor.shard_number),
                Some(current.as_slice()),
                &serde_json::to_vec(&shard)?,
            )? {
                debug!(shard = %shard.id, index, "allocated status slot");
                return Ok(StatusSlot {
                    shard_id: shard.id,
                    index,
                    status: None,
                    reason: String::new(),
                });
            }
            debug!(shard = %shard.id, index, "lost slot claim, reloading shard");
        }

        Err(StatusError::Storage(format!(
            "slot allocation lost {} consecutive races",
            CAS_ATTEMPTS
        )))
    }

    /// Fetch a shard by its public URL.
    pub fn get(&self, shard_id: &str) -> StatusResult<StatusListShard> {
        let number = self.shard_number(shard_id)?;
        match self.store.get(&shard_record(number))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(not_found(shard_id)),
        }
    }

    /// Overwrite the status and reason of a claimed slot.
    pub fn update(&self, slot: &SlotRef, status: &str, reason: &str) -> StatusResult<()> {
        if status.is_empty() {
            return Err(StatusError::InvalidInput("missing status".into()));
        }
        let number = self.shard_number(&slot.shard_id)?;

        for _ in 0..CAS_ATTEMPTS {
            let (current, mut shard) = self.read_shard(number)?;
            let entry = shard.slots.get_mut(slot.index as usize).ok_or_else(|| {
                StatusError::NotFound(format!("slot {} has not been allocated", slot))
            })?;
            entry.status = Some(status.to_string());
            entry.reason = reason.to_string();
            entry.updated = Some(chrono::Utc::now().to_rfc3339());

            if self.store.compare_and_swap(
                &shard_record(number),
                Some(current.as_slice()),
                &serde_json::to_vec(&shard)?,
            )? {
                info!(shard = %shard.id, index = slot.index, status, "updated status slot");
                return Ok(());
            }
        }

        Err(StatusError::Storage(format!(
            "status update of {} lost {} consecutive races",
            slot, CAS_ATTEMPTS
        )))
    }

    /// Move the cursor to the shard after the full one, or to wherever
    /// another allocator has already moved the shared cursor.
    fn advance(&self, cursor: &mut Cursor) -> StatusResult<()> {
        let cursor_id = RecordId::new(CURSOR_RECORD);
        for _ in 0..CAS_ATTEMPTS {
            let (current, record) =
                read_cursor(self.store.as_ref())?.ok_or_else(cursor_missing)?;
            if record.shard_number > cursor.shard_number {
                cursor.shard_number = record.shard_number;
                return Ok(());
            }

            let next = cursor.shard_number + 1;
            let shard = StatusListShard::new(shard_url(&self.base_url, next), self.capacity);
            if self
                .store
                .put_if_absent(&shard_record(next), &serde_json::to_vec(&shard)?)?
            {
                info!(shard = %shard.id, "status list full, started new shard");
            }

            let updated = serde_json::to_vec(&CursorRecord {
                capacity: self.capacity,
                shard_number: next,
            })?;
            if self
                .store
                .compare_and_swap(&cursor_id, Some(current.as_slice()), &updated)?
            {
                cursor.shard_number = next;
                return Ok(());
            }
        }

        Err(StatusError::Storage(format!(
            "status list roll-over lost {} consecutive races",
            CAS_ATTEMPTS
        )))
    }

    /// Parse `<base_url>/<n>`. Only the canonical spelling of `n` matches.
    fn shard_number(&self, shard_id: &str) -> StatusResult<u64> {
        shard_id
            .strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|n| n.parse::<u64>().ok())
            .filter(|n| *n > 0 && shard_url(&self.base_url, *n) == shard_id)
            .ok_or_else(|| not_found(shard_id))
    }

    /// Load a shard together with the exact bytes it was stored as.
    fn read_shard(&self, number: u64) -> StatusResult<(Vec<u8>, StatusListShard)> {
        match self.store.get(&shard_record(number))? {
            Some(bytes) => {
                let shard = serde_json::from_slice(&bytes)?;
                Ok((bytes, shard))
            }
            None => Err(not_found(&shard_url(&self.base_url, number))),
        }
    }

    fn lock(&self) -> StatusResult<MutexGuard<'_, Cursor>> {
        self.cursor
            .lock()
            .map_err(|e| StatusError::Storage(format!("allocator lock poisoned: {}", e)))
    }
}

impl SlotAllocator for StatusListAllocator {
    fn allocate(&self) -> StatusResult<StatusSlot> {
        StatusListAllocator::allocate(self)
    }

    fn update(&self, slot: &SlotRef, status: &str, reason: &str) -> StatusResult<()> {
        StatusListAllocator::update(self, slot, status, reason)
    }
}

fn read_cursor(store: &dyn RecordStore) -> StatusResult<Option<(Vec<u8>, CursorRecord)>> {
    match store.get(&RecordId::new(CURSOR_RECORD))? {
        Some(bytes) => {
            let record = serde_json::from_slice(&bytes)?;
            Ok(Some((bytes, record)))
        }
        None => Ok(None),
    }
}

fn cursor_missing() -> StatusError {
    StatusError::Storage("status list cursor record is missing".into())
}

fn shard_url(base_url: &str, number: u64) -> String {
    format!("{}/{}", base_url, number)
}

fn shard_record(number: u64) -> RecordId {
    RecordId::new(format!("status/shard/{}", number))
}

fn not_found(shard_id: &str) -> StatusError {
    StatusError::NotFound(format!("status list '{}' does not exist", shard_id))
}
