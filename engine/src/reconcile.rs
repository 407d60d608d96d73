//! Reconciliation of queued intents with server responses.
//!
//! This is where the three-way contract with the server is decided. Given a
//! queued intent and what the server said about it, this module works out what
//! must happen locally.
//!
//! # Algorithm
//!
//! 1. Sort pending intents with [`crate::drain_order`]
//! 2. Hold back intents whose entity still waits on an unsettled create
//!    ([`CreateGate`])
//! 3. Translate temporary ids through the [`IdMap`]
//! 4. Send, then [`classify`] the [`RemoteOutcome`] into a [`Disposition`]

use crate::{
    conflict::NewConflict, CollectionName, OperationKind, RecordId, SyncQueueItem, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Longest temporary-id chain followed by [`IdMap::resolve`].
const MAX_TRANSLATION_DEPTH: usize = 8;

/// What the server said about one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RemoteOutcome {
    /// 2xx. Create/update responses carry the canonical payload.
    Success {
        canonical: Option<serde_json::Value>,
    },
    /// 409. The entity changed on the server; carries the server's copy.
    Conflict { server: serde_json::Value },
    /// Anything else, including transport errors.
    Failure { reason: String },
}

impl RemoteOutcome {
    /// Classify an HTTP-like status and its (already unwrapped) body.
    pub fn from_status(status: u16, body: Option<serde_json::Value>) -> Self {
        match status {
            200..=299 => RemoteOutcome::Success { canonical: body },
            409 => RemoteOutcome::Conflict {
                server: body.unwrap_or(serde_json::Value::Null),
            },
            other => RemoteOutcome::Failure {
                reason: format!("server responded with status {other}"),
            },
        }
    }

    /// Wrap a transport-level error.
    pub fn failure(reason: impl Into<String>) -> Self {
        RemoteOutcome::Failure {
            reason: reason.into(),
        }
    }
}

/// What to do locally after an intent was sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Remove the intent and apply the canonical payload, if any.
    Synced {
        canonical: Option<serde_json::Value>,
        /// Server-assigned id replacing the queued entity id
        assigned_id: Option<RecordId>,
    },
    /// Remove the intent and store the conflict. Never retried.
    Conflicted(NewConflict),
    /// Count a failed attempt.
    Failed { reason: String },
}

/// Strip a `{"data": ...}` response envelope.
pub fn unwrap_envelope(body: serde_json::Value) -> serde_json::Value {
    match body {
        serde_json::Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(serde_json::Value::Null)
        }
        other => other,
    }
}

/// Keys a bare status envelope may carry without describing an entity.
const STATUS_KEYS: [&str; 5] = ["success", "message", "status", "error", "ok"];

/// The entity a 2xx body describes, if any.
///
/// Only a non-empty object counts. An object made of nothing but status keys
/// (`{"success": true, "message": "ok"}`) is an acknowledgement, not an
/// entity.
pub fn entity_payload(body: serde_json::Value) -> Option<serde_json::Value> {
    let fields = body.as_object()?;
    if fields.is_empty() || fields.keys().all(|key| STATUS_KEYS.contains(&key.as_str())) {
        return None;
    }
    Some(body)
}

/// The `id` field of a payload, when it is a string.
pub fn canonical_id(payload: &serde_json::Value) -> Option<&str> {
    payload.get("id").and_then(serde_json::Value::as_str)
}

/// Decide what a remote outcome means for the intent that produced it.
pub fn classify(item: &SyncQueueItem, outcome: RemoteOutcome, now: Timestamp) -> Disposition {
    match outcome {
        RemoteOutcome::Success { canonical } => {
            // Delete responses never overwrite local data.
            let canonical = match item.operation {
                OperationKind::Delete => None,
                OperationKind::Create | OperationKind::Update => {
                    canonical.and_then(entity_payload)
                }
            };
            let assigned_id = match (item.operation, &canonical) {
                (OperationKind::Create, Some(payload)) => canonical_id(payload)
                    .filter(|id| *id != item.entity_id)
                    .map(str::to_string),
                _ => None,
            };
            Disposition::Synced {
                canonical,
                assigned_id,
            }
        }
        RemoteOutcome::Conflict { server } => Disposition::Conflicted(NewConflict::new(
            item.collection.clone(),
            item.entity_id.clone(),
            item.payload.clone().unwrap_or(serde_json::Value::Null),
            server,
            now,
        )),
        RemoteOutcome::Failure { reason } => Disposition::Failed { reason },
    }
}

/// Translation table from temporary ids to server-assigned ids.
///
/// Using nested BTreeMaps keeps serialization deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMap {
    entries: BTreeMap<CollectionName, BTreeMap<RecordId, RecordId>>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `temp_id` is now known as `canonical_id`.
    pub fn insert(
        &mut self,
        collection: impl Into<CollectionName>,
        temp_id: impl Into<RecordId>,
        canonical_id: impl Into<RecordId>,
    ) {
        self.entries
            .entry(collection.into())
            .or_default()
            .insert(temp_id.into(), canonical_id.into());
    }

    /// The id an intent must be sent under.
    ///
    /// Unmapped ids resolve to themselves.
    pub fn resolve<'a>(&'a self, collection: &str, id: &'a str) -> &'a str {
        let Some(map) = self.entries.get(collection) else {
            return id;
        };

        let mut current = id;
        for _ in 0..MAX_TRANSLATION_DEPTH {
            match map.get(current) {
                Some(next) if next.as_str() != current => current = next.as_str(),
                _ => break,
            }
        }
        current
    }

    /// Count of translations.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate `(collection, temp_id, canonical_id)` in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&CollectionName, &RecordId, &RecordId)> {
        self.entries
            .iter()
            .flat_map(|(collection, map)| map.iter().map(move |(t, c)| (collection, t, c)))
    }
}

/// Tracks creates that have not settled within one drain cycle.
///
/// An update or delete for an entity whose create is still queued cannot be
/// sent yet: the server does not know the entity, and its id may still change.
/// Such intents are deferred without spending an attempt.
#[derive(Debug, Clone, Default)]
pub struct CreateGate {
    unsettled: HashSet<(CollectionName, RecordId)>,
}

impl CreateGate {
    /// Build the gate from the pending intents of a cycle.
    pub fn from_pending(items: &[SyncQueueItem]) -> Self {
        let unsettled = items
            .iter()
            .filter(|item| item.operation == OperationKind::Create)
            .map(|item| (item.collection.clone(), item.entity_id.clone()))
            .collect();
        Self { unsettled }
    }

    /// Whether an intent has to wait for its entity's create.
    pub fn blocks(&self, item: &SyncQueueItem) -> bool {
        item.operation != OperationKind::Create
            && self
                .unsettled
                .contains(&(item.collection.clone(), item.entity_id.clone()))
    }

    /// Mark an entity's create as settled (synced or diverted to a conflict).
    pub fn settle(&mut self, collection: &str, entity_id: &str) {
        self.unsettled
            .remove(&(collection.to_string(), entity_id.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.unsettled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewQueueItem, Priority, QueueId};
    use serde_json::json;

    fn item(
        queue_id: QueueId,
        operation: OperationKind,
        entity_id: &str,
        payload: Option<serde_json::Value>,
    ) -> SyncQueueItem {
        SyncQueueItem::from_new(
            queue_id,
            NewQueueItem::new(
                operation,
                "patients",
                entity_id,
                payload,
                Priority::Normal,
                1_000 + queue_id as u64,
            ),
        )
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            RemoteOutcome::from_status(201, Some(json!({"id": "1"}))),
            RemoteOutcome::Success {
                canonical: Some(json!({"id": "1"}))
            }
        );
        assert_eq!(
            RemoteOutcome::from_status(409, None),
            RemoteOutcome::Conflict {
                server: serde_json::Value::Null
            }
        );
        assert!(matches!(
            RemoteOutcome::from_status(500, None),
            RemoteOutcome::Failure { .. }
        ));
        assert!(matches!(
            RemoteOutcome::from_status(404, None),
            RemoteOutcome::Failure { .. }
        ));
    }

    #[test]
    fn envelope_is_unwrapped() {
        assert_eq!(
            unwrap_envelope(json!({"success": true, "data": {"id": "p-1"}})),
            json!({"id": "p-1"})
        );
        assert_eq!(unwrap_envelope(json!({"id": "p-1"})), json!({"id": "p-1"}));
    }

    #[test]
    fn classify_update_success() {
        let item = item(1, OperationKind::Update, "p-1", Some(json!({"name": "Ama"})));
        let canonical = json!({"id": "p-1", "name": "Ama", "updatedBy": "srv"});

        let disposition = classify(
            &item,
            RemoteOutcome::Success {
                canonical: Some(canonical.clone()),
            },
            2_000,
        );
        assert_eq!(
            disposition,
            Disposition::Synced {
                canonical: Some(canonical),
                assigned_id: None
            }
        );
    }

    #[test]
    fn classify_success_without_entity_keeps_local_payload() {
        let item = item(1, OperationKind::Update, "p-1", Some(json!({"name": "Ama"})));

        for body in [
            json!({"success": true, "message": "ok"}),
            json!({}),
            json!(true),
            json!([{"id": "p-1"}]),
            json!("updated"),
        ] {
            let disposition = classify(
                &item,
                RemoteOutcome::Success {
                    canonical: Some(body),
                },
                2_000,
            );
            assert_eq!(
                disposition,
                Disposition::Synced {
                    canonical: None,
                    assigned_id: None
                }
            );
        }
    }

    #[test]
    fn entity_payload_keeps_objects_with_fields() {
        let body = json!({"id": "p-1", "success": true});
        assert_eq!(entity_payload(body.clone()), Some(body));
        assert_eq!(entity_payload(json!({"status": "ok"})), None);
    }

    #[test]
    fn classify_create_with_new_id() {
        let item = item(
            1,
            OperationKind::Create,
            "temp_1_abc",
            Some(json!({"id": "temp_1_abc", "name": "Ama"})),
        );

        let disposition = classify(
            &item,
            RemoteOutcome::Success {
                canonical: Some(json!({"id": "srv-7", "name": "Ama"})),
            },
            2_000,
        );
        match disposition {
            Disposition::Synced { assigned_id, .. } => {
                assert_eq!(assigned_id.as_deref(), Some("srv-7"))
            }
            other => panic!("unexpected disposition: {other:?}"),
        }
    }

    #[test]
    fn classify_delete_success_ignores_body() {
        let item = item(1, OperationKind::Delete, "p-1", None);
        let disposition = classify(
            &item,
            RemoteOutcome::Success {
                canonical: Some(json!({"deleted": true})),
            },
            2_000,
        );
        assert_eq!(
            disposition,
            Disposition::Synced {
                canonical: None,
                assigned_id: None
            }
        );
    }

    #[test]
    fn classify_conflict() {
        let item = item(1, OperationKind::Update, "p-1", Some(json!({"ward": "A"})));
        let disposition = classify(
            &item,
            RemoteOutcome::Conflict {
                server: json!({"ward": "C"}),
            },
            2_000,
        );

        match disposition {
            Disposition::Conflicted(conflict) => {
                assert_eq!(conflict.collection, "patients");
                assert_eq!(conflict.entity_id, "p-1");
                assert_eq!(conflict.local_data, json!({"ward": "A"}));
                assert_eq!(conflict.server_data, json!({"ward": "C"}));
                assert_eq!(conflict.detected_at, 2_000);
            }
            other => panic!("unexpected disposition: {other:?}"),
        }
    }

    #[test]
    fn classify_failure() {
        let item = item(1, OperationKind::Update, "p-1", Some(json!({})));
        let disposition = classify(&item, RemoteOutcome::failure("connection reset"), 2_000);
        assert_eq!(
            disposition,
            Disposition::Failed {
                reason: "connection reset".into()
            }
        );
    }

    #[test]
    fn id_map_resolution() {
        let mut map = IdMap::new();
        map.insert("patients", "temp_1_a", "srv-1");

        assert_eq!(map.resolve("patients", "temp_1_a"), "srv-1");
        assert_eq!(map.resolve("patients", "p-2"), "p-2");
        assert_eq!(map.resolve("appointments", "temp_1_a"), "temp_1_a");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn id_map_follows_chains_and_survives_cycles() {
        let mut map = IdMap::new();
        map.insert("patients", "a", "b");
        map.insert("patients", "b", "c");
        assert_eq!(map.resolve("patients", "a"), "c");

        map.insert("patients", "c", "a");
        // Bounded walk; any member of the cycle is acceptable, it must not hang.
        let _ = map.resolve("patients", "a");
    }

    #[test]
    fn id_map_serializes_deterministically() {
        let mut map = IdMap::new();
        map.insert("patients", "temp_2", "srv-2");
        map.insert("appointments", "temp_1", "srv-1");

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(
            json,
            r#"{"entries":{"appointments":{"temp_1":"srv-1"},"patients":{"temp_2":"srv-2"}}}"#
        );
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(entries[0].0, "appointments");
    }

    #[test]
    fn create_gate_blocks_dependents_until_settled() {
        let create = item(1, OperationKind::Create, "temp_1_a", Some(json!({})));
        let update = item(2, OperationKind::Update, "temp_1_a", Some(json!({})));
        let other = item(3, OperationKind::Update, "p-9", Some(json!({})));

        let mut gate = CreateGate::from_pending(&[create.clone(), update.clone(), other.clone()]);
        assert!(!gate.blocks(&create));
        assert!(gate.blocks(&update));
        assert!(!gate.blocks(&other));

        gate.settle("patients", "temp_1_a");
        assert!(!gate.blocks(&update));
        assert!(gate.is_empty());
    }
}
