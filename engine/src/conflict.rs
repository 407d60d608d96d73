//! Conflict records and the rules for resolving them.
//!
//! A conflict is created when the server reports that an entity changed
//! underneath a queued intent. Nothing is merged automatically: a person picks
//! the local side, the server side, or supplies a merged payload.

use crate::{error::Result, CollectionName, ConflictId, Error, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// How a conflict was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Keep the local snapshot
    Local,
    /// Take the server snapshot
    Server,
    /// Use a caller-supplied merged payload
    Merge,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Local => "local",
            Resolution::Server => "server",
            Resolution::Merge => "merge",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "local" => Ok(Resolution::Local),
            "server" => Ok(Resolution::Server),
            "merge" => Ok(Resolution::Merge),
            other => Err(Error::UnknownResolution(other.to_string())),
        }
    }
}

/// A conflict that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConflict {
    pub collection: CollectionName,
    pub entity_id: RecordId,
    pub local_data: serde_json::Value,
    pub server_data: serde_json::Value,
    pub detected_at: Timestamp,
}

impl NewConflict {
    pub fn new(
        collection: impl Into<CollectionName>,
        entity_id: impl Into<RecordId>,
        local_data: serde_json::Value,
        server_data: serde_json::Value,
        detected_at: Timestamp,
    ) -> Self {
        Self {
            collection: collection.into(),
            entity_id: entity_id.into(),
            local_data,
            server_data,
            detected_at,
        }
    }
}

/// A stored divergence between local and server state.
///
/// Conflicts are never deleted; resolved ones stay as an audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub conflict_id: ConflictId,
    pub collection: CollectionName,
    pub entity_id: RecordId,
    /// Payload of the intent that was rejected
    pub local_data: serde_json::Value,
    /// Server's current payload at detection time
    pub server_data: serde_json::Value,
    pub detected_at: Timestamp,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<Timestamp>,
}

impl ConflictRecord {
    /// Materialize a new conflict under the id the store assigned to it.
    pub fn from_new(conflict_id: ConflictId, conflict: NewConflict) -> Self {
        Self {
            conflict_id,
            collection: conflict.collection,
            entity_id: conflict.entity_id,
            local_data: conflict.local_data,
            server_data: conflict.server_data,
            detected_at: conflict.detected_at,
            resolved: false,
            resolution: None,
            resolved_at: None,
        }
    }

    /// Check if the conflict still needs a decision.
    pub fn is_pending(&self) -> bool {
        !self.resolved
    }

    /// The payload that becomes the record of truth for a resolution.
    ///
    /// `Merge` without a merged payload falls back to the local snapshot.
    pub fn chosen_payload(
        &self,
        resolution: Resolution,
        merged: Option<serde_json::Value>,
    ) -> serde_json::Value {
        match resolution {
            Resolution::Local => self.local_data.clone(),
            Resolution::Server => self.server_data.clone(),
            Resolution::Merge => merged.unwrap_or_else(|| self.local_data.clone()),
        }
    }

    /// Resolve the conflict and return the payload to write back.
    pub fn resolve(
        &mut self,
        resolution: Resolution,
        merged: Option<serde_json::Value>,
        resolved_at: Timestamp,
    ) -> Result<serde_json::Value> {
        if self.resolved {
            return Err(Error::ConflictAlreadyResolved(self.conflict_id));
        }

        let payload = self.chosen_payload(resolution, merged);
        self.resolved = true;
        self.resolution = Some(resolution);
        self.resolved_at = Some(resolved_at);
        Ok(payload)
    }

    /// Whether the rejected intent was a delete.
    ///
    /// A delete carries no payload, so its local side is stored as `null`.
    pub fn is_rejected_delete(&self) -> bool {
        self.local_data.is_null()
    }

    /// Whether resolving with `resolution` puts the rejected delete back in
    /// the queue.
    ///
    /// True when the local side wins on a delete conflict, either explicitly
    /// or through a merge without a merged payload.
    pub fn reasserts_delete(
        &self,
        resolution: Resolution,
        merged: Option<&serde_json::Value>,
    ) -> bool {
        self.is_rejected_delete()
            && match resolution {
                Resolution::Local => true,
                Resolution::Merge => merged.is_none(),
                Resolution::Server => false,
            }
    }

    /// Top-level fields that differ between the two snapshots.
    pub fn differences(&self) -> Vec<String> {
        field_differences(&self.local_data, &self.server_data)
    }
}

/// List the top-level object fields whose values differ, sorted by name.
///
/// A field missing on one side differs from any value on the other. Only
/// object payloads are compared field by field; for anything else the result
/// is empty.
pub fn field_differences(local: &serde_json::Value, server: &serde_json::Value) -> Vec<String> {
    let (Some(local), Some(server)) = (local.as_object(), server.as_object()) else {
        return Vec::new();
    };

    let keys: BTreeSet<&String> = local.keys().chain(server.keys()).collect();
    keys.into_iter()
        .filter(|key| local.get(*key) != server.get(*key))
        .cloned()
        .collect()
}
