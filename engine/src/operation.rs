//! Queued mutation intents.
//!
//! Local writes are not pushed directly; each one appends a [`SyncQueueItem`]
//! that the dispatcher later turns into a remote call. Ordering and attempt
//! accounting live here so they stay independent of storage.

use crate::{CollectionName, Error, QueueId, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attempts allowed before an intent is dropped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// The kind of mutation an intent carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    /// Stable lowercase name, used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// Whether intents of this kind send a payload.
    pub fn carries_payload(&self) -> bool {
        !matches!(self, OperationKind::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(Error::UnknownOperation(other.to_string())),
        }
    }
}

/// Drain priority band. `High` drains first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Sort rank; lower drains earlier.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(Error::UnknownPriority(other.to_string())),
        }
    }
}

/// An intent that has not been assigned a queue id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQueueItem {
    pub operation: OperationKind,
    pub collection: CollectionName,
    pub entity_id: RecordId,
    pub payload: Option<serde_json::Value>,
    pub priority: Priority,
    pub enqueued_at: Timestamp,
    pub max_attempts: u32,
}

impl NewQueueItem {
    /// Create a new intent with the default attempt budget.
    ///
    /// Delete intents never carry a payload; one passed in is discarded.
    pub fn new(
        operation: OperationKind,
        collection: impl Into<CollectionName>,
        entity_id: impl Into<RecordId>,
        payload: Option<serde_json::Value>,
        priority: Priority,
        enqueued_at: Timestamp,
    ) -> Self {
        Self {
            operation,
            collection: collection.into(),
            entity_id: entity_id.into(),
            payload: if operation.carries_payload() {
                payload
            } else {
                None
            },
            priority,
            enqueued_at,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the attempt budget. Values below one are raised to one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Result of counting one more failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Keep the item for the next drain cycle
    Retry { attempts: u32 },
    /// Budget spent; the item must be dropped
    Exhausted { attempts: u32 },
}

/// A pending intent stored in the sync queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Monotonically increasing id, used as removal key
    pub queue_id: QueueId,
    pub operation: OperationKind,
    pub collection: CollectionName,
    pub entity_id: RecordId,
    /// Snapshot to send (absent for delete)
    pub payload: Option<serde_json::Value>,
    pub priority: Priority,
    pub enqueued_at: Timestamp,
    /// Failed attempts so far
    pub attempts: u32,
    pub max_attempts: u32,
}

impl SyncQueueItem {
    /// Materialize a new intent under the id the queue assigned to it.
    pub fn from_new(queue_id: QueueId, item: NewQueueItem) -> Self {
        Self {
            queue_id,
            operation: item.operation,
            collection: item.collection,
            entity_id: item.entity_id,
            payload: item.payload,
            priority: item.priority,
            enqueued_at: item.enqueued_at,
            attempts: 0,
            max_attempts: item.max_attempts,
        }
    }

    /// Check whether this intent addresses the given entity.
    pub fn targets(&self, collection: &str, entity_id: &str) -> bool {
        self.collection == collection && self.entity_id == entity_id
    }

    /// Count one failed attempt.
    pub fn record_attempt(&mut self) -> AttemptOutcome {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= self.max_attempts {
            AttemptOutcome::Exhausted {
                attempts: self.attempts,
            }
        } else {
            AttemptOutcome::Retry {
                attempts: self.attempts,
            }
        }
    }

    /// Sort key used by [`drain_order`].
    ///
    /// Ordered by: (priority rank, enqueued_at, queue_id). The queue id breaks
    /// ties between intents written in the same millisecond.
    pub fn drain_key(&self) -> (u8, Timestamp, QueueId) {
        (self.priority.rank(), self.enqueued_at, self.queue_id)
    }
}

/// Sort pending intents into the order they must be sent.
pub fn drain_order(items: &mut [SyncQueueItem]) {
    items.sort_by_key(SyncQueueItem::drain_key);
}
