//! Record types for locally stored domain data.

use crate::{error::Result, CollectionName, Error, RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// Prefix of client-generated ids that have not been confirmed by the server.
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Build a temporary id (`temp_<millis>_<suffix>`) for a record created offline.
pub fn temp_id(timestamp: Timestamp, suffix: &str) -> RecordId {
    format!("{TEMP_ID_PREFIX}{timestamp}_{suffix}")
}

/// Check whether an id was generated locally and is still awaiting a server id.
pub fn is_temporary(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// A domain entity as stored on this device.
///
/// The `id` and `collection` never change through normal writes; only the
/// payload, timestamps and tombstone do. The single exception is
/// [`LocalRecord::rekey`], used when the server replaces a temporary id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    /// Collection this record belongs to
    pub collection: CollectionName,
    /// Unique identifier within the collection
    pub id: RecordId,
    /// Opaque domain data
    pub payload: serde_json::Value,
    /// Time of the last local write (milliseconds since epoch)
    pub last_modified: Timestamp,
    /// Whether the last local write happened while disconnected
    pub is_offline: bool,
    /// Soft delete flag (tombstone)
    #[serde(default)]
    pub deleted: bool,
    /// When the tombstone was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}

impl LocalRecord {
    /// Create a new, unstamped record.
    pub fn new(
        collection: impl Into<CollectionName>,
        id: impl Into<RecordId>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            payload,
            last_modified: 0,
            is_offline: false,
            deleted: false,
            deleted_at: None,
        }
    }

    /// Check if record is active (not deleted).
    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    /// Record the time of a write and the connectivity it happened under.
    pub fn stamp(&mut self, timestamp: Timestamp, offline: bool) {
        self.last_modified = timestamp;
        self.is_offline = offline;
    }

    /// Replace the payload wholesale. Tombstone state is left untouched.
    pub fn replace_payload(&mut self, payload: serde_json::Value) {
        self.payload = payload;
    }

    /// Shallow-merge the fields of `partial` over the current payload.
    ///
    /// A non-object current payload is replaced by `partial`.
    pub fn merge_payload(&mut self, partial: &serde_json::Value) -> Result<()> {
        let Some(fields) = partial.as_object() else {
            return Err(Error::InvalidPayload(format!(
                "partial update for {}/{} must be a JSON object",
                self.collection, self.id
            )));
        };

        match self.payload.as_object_mut() {
            Some(current) => {
                for (key, value) in fields {
                    current.insert(key.clone(), value.clone());
                }
            }
            None => self.payload = partial.clone(),
        }
        Ok(())
    }

    /// Mark record as deleted (tombstone).
    pub fn mark_deleted(&mut self, timestamp: Timestamp) {
        self.deleted = true;
        self.deleted_at = Some(timestamp);
    }

    /// Move this record to the id the server assigned.
    pub fn rekey(mut self, id: impl Into<RecordId>) -> Self {
        self.id = id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_record() {
        let record = LocalRecord::new("patients", "p-1", json!({"name": "Ama"}));

        assert_eq!(record.collection, "patients");
        assert_eq!(record.id, "p-1");
        assert_eq!(record.payload, json!({"name": "Ama"}));
        assert!(record.is_active());
        assert!(!record.is_offline);
    }

    #[test]
    fn stamp_sets_time_and_connectivity() {
        let mut record = LocalRecord::new("patients", "p-1", json!({}));
        record.stamp(2_000, true);

        assert_eq!(record.last_modified, 2_000);
        assert!(record.is_offline);
    }

    #[test]
    fn merge_payload_overrides_fields() {
        let mut record = LocalRecord::new(
            "patients",
            "p-1",
            json!({"name": "Ama", "phoneNumber": "020"}),
        );
        record
            .merge_payload(&json!({"phoneNumber": "024", "ward": "B"}))
            .unwrap();

        assert_eq!(
            record.payload,
            json!({"name": "Ama", "phoneNumber": "024", "ward": "B"})
        );
        assert_eq!(record.id, "p-1");
    }

    #[test]
    fn merge_payload_rejects_non_object() {
        let mut record = LocalRecord::new("patients", "p-1", json!({"name": "Ama"}));
        let err = record.merge_payload(&json!("nope")).unwrap_err();

        assert!(matches!(err, Error::InvalidPayload(_)));
        assert_eq!(record.payload, json!({"name": "Ama"}));
    }

    #[test]
    fn delete_record() {
        let mut record = LocalRecord::new("patients", "p-1", json!({"name": "Ama"}));
        record.mark_deleted(3_000);

        assert!(record.deleted);
        assert!(!record.is_active());
        assert_eq!(record.deleted_at, Some(3_000));
    }

    #[test]
    fn replace_payload_keeps_tombstone() {
        let mut record = LocalRecord::new("patients", "p-1", json!({"name": "Ama"}));
        record.mark_deleted(3_000);
        record.replace_payload(json!({"name": "Ama K."}));

        assert!(record.deleted);
        assert_eq!(record.payload, json!({"name": "Ama K."}));
    }

    #[test]
    fn temp_ids() {
        let id = temp_id(1706745600000, "k3j9x0a1b");
        assert_eq!(id, "temp_1706745600000_k3j9x0a1b");
        assert!(is_temporary(&id));
        assert!(!is_temporary("65a1f0c2e4"));
    }

    #[test]
    fn rekey_changes_only_id() {
        let record = LocalRecord::new("patients", "temp_1_abc", json!({"name": "Ama"}));
        let rekeyed = record.clone().rekey("srv-9");

        assert_eq!(rekeyed.id, "srv-9");
        assert_eq!(rekeyed.collection, record.collection);
        assert_eq!(rekeyed.payload, record.payload);
    }

    #[test]
    fn serialization_uses_camel_case() {
        let mut record = LocalRecord::new("patients", "p-1", json!({"name": "Ama"}));
        record.stamp(1_000, true);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["lastModified"], 1_000);
        assert_eq!(json["isOffline"], true);
        assert!(json.get("deletedAt").is_none());

        let parsed: LocalRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }
}
