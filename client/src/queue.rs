//! Durable sync queue.
//!
//! Appends intents to the `sync_queue` table and, while online, nudges the
//! dispatcher through a [`SyncTrigger`]. Enqueueing never waits for the
//! network.

use clinisync_engine::{
    AttemptOutcome, CollectionName, NewQueueItem, OperationKind, Priority, QueueId, RecordId,
    SyncQueueItem,
};
use tokio::sync::mpsc;

use crate::db;
use crate::error::Result;
use crate::store::RecordStore;

/// Fire-and-forget request for a drain cycle.
///
/// Triggers are coalesced by the receiving worker: a burst of triggers leads
/// to a single drain.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::UnboundedSender<()>,
}

/// Receiving side of [`SyncTrigger`].
pub type TriggerReceiver = mpsc::UnboundedReceiver<()>;

impl SyncTrigger {
    pub fn channel() -> (Self, TriggerReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Request a drain. Returns false once the worker has stopped.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Append-only intent log layered on the record store.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    store: RecordStore,
    trigger: SyncTrigger,
    max_attempts: u32,
}

impl SyncQueue {
    pub fn new(store: RecordStore, trigger: SyncTrigger, max_attempts: u32) -> Self {
        Self {
            store,
            trigger,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Append an intent with `attempts = 0`.
    ///
    /// When online, a drain is requested; the call does not wait for it.
    pub async fn enqueue(
        &self,
        operation: OperationKind,
        collection: impl Into<CollectionName>,
        entity_id: impl Into<RecordId>,
        payload: Option<serde_json::Value>,
        priority: Priority,
    ) -> Result<SyncQueueItem> {
        let new = self.new_item(operation, collection, entity_id, payload, priority);
        let queue_id = db::insert_queue_item(self.store.pool(), &new).await?;
        let item = SyncQueueItem::from_new(queue_id, new);

        tracing::debug!(
            queue_id,
            operation = %item.operation,
            collection = %item.collection,
            entity_id = %item.entity_id,
            priority = %item.priority,
            "Intent enqueued"
        );

        self.notify();
        Ok(item)
    }

    /// Build an intent stamped with the current time and attempt budget,
    /// without storing it.
    pub fn new_item(
        &self,
        operation: OperationKind,
        collection: impl Into<CollectionName>,
        entity_id: impl Into<RecordId>,
        payload: Option<serde_json::Value>,
        priority: Priority,
    ) -> NewQueueItem {
        NewQueueItem::new(
            operation,
            collection,
            entity_id,
            payload,
            priority,
            self.store.now(),
        )
        .with_max_attempts(self.max_attempts)
    }

    /// Request a drain if online.
    pub fn notify(&self) {
        if self.store.is_online() && !self.trigger.fire() {
            tracing::debug!("Sync worker stopped; trigger dropped");
        }
    }

    /// All items not yet removed, in insertion order.
    pub async fn pending(&self) -> Result<Vec<SyncQueueItem>> {
        Ok(db::get_pending_items(self.store.pool()).await?)
    }

    pub async fn pending_count(&self) -> Result<u64> {
        Ok(db::count_pending_items(self.store.pool()).await?)
    }

    pub async fn get(&self, queue_id: QueueId) -> Result<Option<SyncQueueItem>> {
        Ok(db::get_queue_item(self.store.pool(), queue_id).await?)
    }

    /// Remove an item. Returns whether it was still queued.
    pub async fn remove(&self, queue_id: QueueId) -> Result<bool> {
        Ok(db::delete_queue_item(self.store.pool(), queue_id).await?)
    }

    /// Count one failed attempt against an item.
    ///
    /// The item is re-read inside the transaction so concurrent updates are
    /// never overwritten. An exhausted item is removed. Returns `None` when
    /// the item is no longer queued.
    pub async fn record_failure(&self, queue_id: QueueId) -> Result<Option<AttemptOutcome>> {
        let mut tx = self.store.pool().begin().await?;

        let Some(mut item) = db::get_queue_item(&mut *tx, queue_id).await? else {
            return Ok(None);
        };

        let outcome = item.record_attempt();
        match outcome {
            AttemptOutcome::Retry { attempts } => {
                db::update_attempts(&mut *tx, queue_id, attempts).await?;
            }
            AttemptOutcome::Exhausted { .. } => {
                db::delete_queue_item(&mut *tx, queue_id).await?;
            }
        }
        tx.commit().await?;

        Ok(Some(outcome))
    }
}
