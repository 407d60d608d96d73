//! Conflict manager.
//!
//! Holds divergences reported by the server and feeds a person's decision
//! back into the normal write path.

use clinisync_engine::{
    ConflictId, ConflictRecord, LocalRecord, OperationKind, Priority, Resolution,
};

use crate::db;
use crate::error::{Result, SyncError};
use crate::queue::SyncQueue;
use crate::store::RecordStore;

/// Lists and resolves conflicts.
#[derive(Debug, Clone)]
pub struct ConflictManager {
    store: RecordStore,
    queue: SyncQueue,
}

impl ConflictManager {
    pub fn new(store: RecordStore, queue: SyncQueue) -> Self {
        Self { store, queue }
    }

    /// Unresolved conflicts, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<ConflictRecord>> {
        Ok(db::get_pending_conflicts(self.store.pool()).await?)
    }

    pub async fn pending_count(&self) -> Result<u64> {
        Ok(db::count_pending_conflicts(self.store.pool()).await?)
    }

    /// Get a conflict, resolved or not.
    pub async fn get(&self, conflict_id: ConflictId) -> Result<Option<ConflictRecord>> {
        Ok(db::get_conflict(self.store.pool(), conflict_id).await?)
    }

    /// Top-level fields that differ between the two sides of a conflict.
    pub async fn differences(&self, conflict_id: ConflictId) -> Result<Vec<String>> {
        self.get(conflict_id)
            .await?
            .map(|conflict| conflict.differences())
            .ok_or(SyncError::ConflictNotFound(conflict_id))
    }

    /// Resolve a conflict.
    ///
    /// The chosen payload is written to the store, the conflict is marked
    /// resolved and a high-priority intent is queued to propagate the
    /// decision. When the rejected intent was a delete and the local side
    /// wins (`Local`, or `Merge` without a merged payload), the delete itself
    /// is queued again instead of an update.
    ///
    /// Any other choice that comes out as `null`, such as `Server` after a
    /// 409 without a body, fails with [`SyncError::EmptyResolution`] and
    /// leaves the conflict pending.
    ///
    /// Returns the record as written.
    pub async fn resolve(
        &self,
        conflict_id: ConflictId,
        resolution: Resolution,
        merged: Option<serde_json::Value>,
    ) -> Result<LocalRecord> {
        let now = self.store.now();
        let offline = !self.store.is_online();
        let mut tx = self.store.pool().begin().await?;

        let mut conflict = db::get_conflict(&mut *tx, conflict_id)
            .await?
            .ok_or(SyncError::ConflictNotFound(conflict_id))?;
        let redo_delete = conflict.reasserts_delete(resolution, merged.as_ref());
        let payload = conflict
            .resolve(resolution, merged, now)
            .map_err(|_| SyncError::ConflictAlreadyResolved(conflict_id))?;
        if payload.is_null() && !redo_delete {
            // Dropping the transaction leaves the conflict pending.
            return Err(SyncError::EmptyResolution(conflict_id));
        }

        let existing = db::get_record(&mut *tx, &conflict.collection, &conflict.entity_id).await?;

        let mut record = existing.unwrap_or_else(|| {
            LocalRecord::new(&conflict.collection, &conflict.entity_id, payload.clone())
        });
        let intent = if redo_delete {
            if !record.deleted {
                record.mark_deleted(now);
            }
            self.queue.new_item(
                OperationKind::Delete,
                &conflict.collection,
                &conflict.entity_id,
                None,
                Priority::High,
            )
        } else {
            record.replace_payload(payload.clone());
            record.deleted = false;
            record.deleted_at = None;
            self.queue.new_item(
                OperationKind::Update,
                &conflict.collection,
                &conflict.entity_id,
                Some(payload),
                Priority::High,
            )
        };
        record.stamp(now, offline);

        db::upsert_record(&mut *tx, &record).await?;
        db::mark_conflict_resolved(&mut *tx, &conflict).await?;
        let queue_id = db::insert_queue_item(&mut *tx, &intent).await?;
        tx.commit().await?;

        tracing::info!(
            conflict_id,
            resolution = %resolution,
            collection = %record.collection,
            entity_id = %record.id,
            queue_id,
            "Conflict resolved"
        );

        self.queue.notify();
        Ok(record)
    }
}
