//! Snapshots
//!
//! A portable copy of every live record, used to back up a region before a
//! format or to move records between devices. Encoded with bincode.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NvmError, Result};
use crate::record::is_valid_id;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u16 = 1;

/// A single exported record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: u64,
    pub data: Vec<u8>,
}

/// Every live record of a store, ordered by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    version: u16,
    records: Vec<SnapshotRecord>,
}

/// Outcome of `NvmStore::import`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Records appended
    pub written: u64,
    /// Records already up to date
    pub unchanged: u64,
}

impl Snapshot {
    pub(crate) fn from_records(records: BTreeMap<u64, Vec<u8>>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            records: records
                .into_iter()
                .map(|(id, data)| SnapshotRecord { id, data })
                .collect(),
        }
    }

    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Payload stored under `id`
    pub fn get(&self, id: u64) -> Option<&[u8]> {
        self.records
            .binary_search_by_key(&id, |record| record.id)
            .ok()
            .map(|index| self.records[index].data.as_slice())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| NvmError::Serialization(e.to_string()))
    }

    /// Decode and validate a snapshot
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot =
            bincode::deserialize(bytes).map_err(|e| NvmError::Serialization(e.to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(NvmError::Serialization(format!(
                "Unsupported snapshot version: {}",
                snapshot.version
            )));
        }
        if let Some(record) = snapshot.records.iter().find(|r| !is_valid_id(r.id)) {
            return Err(NvmError::Serialization(format!(
                "Snapshot contains reserved id {:#018x}",
                record.id
            )));
        }
        if snapshot.records.windows(2).any(|w| w[0].id >= w[1].id) {
            return Err(NvmError::Serialization(
                "Snapshot records are not sorted by unique id".to_string(),
            ));
        }
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }
}
