use crate::error::{StatusError, StatusResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `type` of the credential status reference attached at issuance.
pub const STATUS_LIST_TYPE: &str = "CredentialStatusList2017";

/// Vocabulary declared by credentials that carry a status reference.
pub const STATUS_LIST_CONTEXT: &str = "https://w3id.org/vc-status-list-2017/v1";

/// Slots per shard unless configured otherwise.
pub const DEFAULT_CAPACITY: u32 = 50;

// ---------------------------------------------------------------------------
// Shards and slots
// ---------------------------------------------------------------------------

/// Status of one claimed slot. `status == None` means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotState {
    pub status: Option<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// One credential status list. `slots` holds only claimed slots, in claim
/// order, so `slots.len()` is the fill count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusListShard {
    pub id: String,
    pub capacity: u32,
    pub slots: Vec<SlotState>,
}

impl StatusListShard {
    pub fn new(id: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            capacity,
            slots: Vec::new(),
        }
    }

    pub fn fill(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn is_full(&self) -> bool {
        self.fill() >= self.capacity
    }

    pub fn slot(&self, index: u32) -> Option<StatusSlot> {
        self.slots.get(index as usize).map(|s| StatusSlot {
            shard_id: self.id.clone(),
            index,
            status: s.status.clone(),
            reason: s.reason.clone(),
        })
    }
}

/// A slot as handed out to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSlot {
    pub shard_id: String,
    pub index: u32,
    pub status: Option<String>,
    pub reason: String,
}

impl StatusSlot {
    pub fn slot_ref(&self) -> SlotRef {
        SlotRef {
            shard_id: self.shard_id.clone(),
            index: self.index,
        }
    }
}

// ---------------------------------------------------------------------------
// SlotRef: "<shard url>#<index>"
// ---------------------------------------------------------------------------

/// Public reference to a slot, as carried in a credential's
/// `credentialStatus.id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub shard_id: String,
    pub index: u32,
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.shard_id, self.index)
    }
}

impl FromStr for SlotRef {
    type Err = StatusError;

    fn from_str(s: &str) -> StatusResult<Self> {
        let (shard_id, index) = s.rsplit_once('#').ok_or_else(|| {
            StatusError::InvalidInput(format!("status reference '{}' has no slot index", s))
        })?;
        if shard_id.is_empty() {
            return Err(StatusError::InvalidInput(format!(
                "status reference '{}' has no shard id",
                s
            )));
        }
        let index = index.parse::<u32>().map_err(|_| {
            StatusError::InvalidInput(format!("invalid slot index '{}' in '{}'", index, s))
        })?;
        Ok(Self {
            shard_id: shard_id.to_string(),
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_ref_display_and_parse() {
        let r = SlotRef {
            shard_id: "https://issuer.example.com/status/2".into(),
            index: 17,
        };
        assert_eq!(r.to_string(), "https://issuer.example.com/status/2#17");
        assert_eq!(r.to_string().parse::<SlotRef>().unwrap(), r);
    }

    #[test]
    fn test_slot_ref_rejects_malformed() {
        for bad in [
            "https://issuer.example.com/status/2",
            "#3",
            "https://issuer.example.com/status/2#",
            "https://issuer.example.com/status/2#-1",
            "https://issuer.example.com/status/2#x",
        ] {
            assert!(
                matches!(bad.parse::<SlotRef>(), Err(StatusError::InvalidInput(_))),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn test_shard_fill_and_slot_lookup() {
        let mut shard = StatusListShard::new("https://h/status/1", 2);
        assert_eq!(shard.fill(), 0);
        assert!(shard.slot(0).is_none());
        shard.slots.push(SlotState::default());
        shard.slots.push(SlotState {
            status: Some("revoked".into()),
            reason: "key compromise".into(),
            updated: None,
        });
        assert!(shard.is_full());
        let slot = shard.slot(1).unwrap();
        assert_eq!(slot.status.as_deref(), Some("revoked"));
        assert_eq!(slot.slot_ref().to_string(), "https://h/status/1#1");
    }

    #[test]
    fn test_unset_slot_serializes_null_status() {
        let json = serde_json::to_string(&SlotState::default()).unwrap();
        assert_eq!(json, r#"{"status":null,"reason":""}"#);
    }
}
