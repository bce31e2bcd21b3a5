//! Credential status lists.
//!
//! Every issued credential with status tracking gets one slot in a
//! fixed-capacity shard. Shards fill in order; a full shard is never
//! reopened and the next allocation starts a new one at index 0. Slots are
//! claimed once and afterwards only their status and reason change.

pub mod allocator;
pub mod csl;
pub mod error;

pub use allocator::{SlotAllocator, StatusListAllocator};
pub use csl::{
    SlotRef, SlotState, StatusListShard, StatusSlot, DEFAULT_CAPACITY, STATUS_LIST_CONTEXT,
    STATUS_LIST_TYPE,
};
pub use error::{StatusError, StatusResult};
