//! Snapshot types for exporting and restoring the local store.
//!
//! A snapshot captures everything the device holds: records, pending intents,
//! conflicts (resolved ones included) and the id translation table. It is used
//! for backups and diagnostics and is designed for deterministic serialization.

use crate::{
    error::Result, CollectionName, ConflictRecord, Error, IdMap, LocalRecord, RecordId,
    SyncQueueItem, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time snapshot of the local store.
///
/// Uses BTreeMap instead of HashMap for deterministic serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// When the snapshot was taken
    pub exported_at: Timestamp,
    /// All records organized by collection, then by record ID
    pub collections: BTreeMap<CollectionName, BTreeMap<RecordId, LocalRecord>>,
    /// Pending intents in queue id order
    pub queue: Vec<SyncQueueItem>,
    /// Every conflict ever detected
    pub conflicts: Vec<ConflictRecord>,
    /// Temporary id translations
    #[serde(default)]
    pub id_map: IdMap,
}

impl StoreSnapshot {
    /// Create a new empty snapshot.
    pub fn new(exported_at: Timestamp) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            exported_at,
            collections: BTreeMap::new(),
            queue: Vec::new(),
            conflicts: Vec::new(),
            id_map: IdMap::new(),
        }
    }

    /// Add a record to the snapshot.
    pub fn add_record(&mut self, record: LocalRecord) {
        self.collections
            .entry(record.collection.clone())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Get a record from the snapshot.
    pub fn get_record(&self, collection: &str, id: &str) -> Option<&LocalRecord> {
        self.collections.get(collection)?.get(id)
    }

    /// Iterate over all records.
    pub fn records(&self) -> impl Iterator<Item = &LocalRecord> {
        self.collections.values().flat_map(BTreeMap::values)
    }

    /// Count total records across all collections.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(BTreeMap::len).sum()
    }

    /// Count active (non-deleted) records.
    pub fn active_record_count(&self) -> usize {
        self.records().filter(|r| r.is_active()).count()
    }

    /// Count unresolved conflicts.
    pub fn pending_conflict_count(&self) -> usize {
        self.conflicts.iter().filter(|c| c.is_pending()).count()
    }

    /// Check internal consistency before importing.
    pub fn validate(&self) -> Result<()> {
        for (collection, records) in &self.collections {
            for (id, record) in records {
                if &record.collection != collection || &record.id != id {
                    return Err(Error::InvalidSnapshot(format!(
                        "record {}/{} filed under {collection}/{id}",
                        record.collection, record.id
                    )));
                }
            }
        }

        let mut queue_ids = HashSet::new();
        for item in &self.queue {
            if !queue_ids.insert(item.queue_id) {
                return Err(Error::InvalidSnapshot(format!(
                    "duplicate queue id: {}",
                    item.queue_id
                )));
            }
        }

        let mut conflict_ids = HashSet::new();
        for conflict in &self.conflicts {
            if !conflict_ids.insert(conflict.conflict_id) {
                return Err(Error::InvalidSnapshot(format!(
                    "duplicate conflict id: {}",
                    conflict.conflict_id
                )));
            }
        }

        Ok(())
    }

    /// Get lightweight metadata.
    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata {
            format_version: self.format_version,
            exported_at: self.exported_at,
            record_count: self.record_count(),
            pending_count: self.queue.len(),
            conflict_count: self.pending_conflict_count(),
        }
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        // Validate format version
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}

/// Metadata about a snapshot (without the full data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub format_version: u32,
    pub exported_at: Timestamp,
    pub record_count: usize,
    pub pending_count: usize,
    /// Unresolved conflicts only
    pub conflict_count: usize,
}
