//! Sync events broadcast to the UI layer.

use clinisync_engine::{CollectionName, ConflictId, OperationKind, QueueId, RecordId};
use serde::Serialize;

/// Counters for one drain cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Intents sent to the remote
    pub processed: usize,
    pub synced: usize,
    pub conflicts: usize,
    /// Failed but kept for the next cycle
    pub retried: usize,
    /// Failed for the last time and removed
    pub dropped: usize,
    /// Held back behind an unsettled create
    pub deferred: usize,
}

/// Something the dispatcher did that the UI may want to surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// An intent was accepted by the server.
    #[serde(rename_all = "camelCase")]
    Synced {
        queue_id: QueueId,
        operation: OperationKind,
        collection: CollectionName,
        entity_id: RecordId,
    },
    /// The server rejected an intent as conflicting; a person must decide.
    #[serde(rename_all = "camelCase")]
    Conflict {
        conflict_id: ConflictId,
        collection: CollectionName,
        entity_id: RecordId,
    },
    /// An intent ran out of attempts and will never be sent.
    #[serde(rename_all = "camelCase")]
    Dropped {
        queue_id: QueueId,
        operation: OperationKind,
        collection: CollectionName,
        entity_id: RecordId,
        attempts: u32,
        reason: String,
    },
    /// A drain cycle completed.
    DrainFinished(DrainReport),
}
