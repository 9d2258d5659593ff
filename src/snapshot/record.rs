//! Snapshot records.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, versioned blob of state.
///
/// `data` is a `BTreeMap` so persisted files have sorted keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub key: String,
    /// Number of committed mutations; 0 means never written.
    pub version: u64,
    /// Unix seconds of the last committed mutation.
    pub updated_at: u64,
    pub data: BTreeMap<String, Value>,
}

impl SnapshotRecord {
    /// An empty, never-persisted record.
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: 0,
            updated_at: 0,
            data: BTreeMap::new(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.version == 0
    }

    /// The record that results from committing `data` on top of this one.
    pub(crate) fn next(&self, data: BTreeMap<String, Value>) -> Self {
        Self {
            key: self.key.clone(),
            version: self.version + 1,
            updated_at: unix_now(),
            data,
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
