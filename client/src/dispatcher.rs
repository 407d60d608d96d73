//! Sync dispatcher.
//!
//! Turns queued intents into remote calls, one drain cycle at a time.
//!
//! # Drain cycle
//!
//! 1. Skip entirely while offline or while another cycle is in flight
//! 2. Load pending intents and sort them with [`drain_order`]
//! 3. For each intent, sequentially:
//!    - defer it if its entity still waits on an unsettled create
//!    - translate temporary ids through the id map
//!    - send it and [`classify`] the outcome
//!    - synced: remove it, apply the canonical payload (or purge the
//!      tombstone for a delete), record any server-assigned id
//!    - conflicted: remove it and store a conflict, never retried
//!    - failed: count an attempt, dropping the intent once its budget is spent
//!
//! Going offline mid-cycle does not abort the cycle; it only stops new ones.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use clinisync_engine::{
    classify, drain_order, AttemptOutcome, CreateGate, Disposition, IdMap, OperationKind,
    SyncQueueItem, Timestamp,
};
use tokio::sync::broadcast;

use crate::db;
use crate::error::Result;
use crate::events::{DrainReport, SyncEvent};
use crate::queue::{SyncQueue, TriggerReceiver};
use crate::remote::RemoteService;
use crate::store::RecordStore;

const EVENT_CAPACITY: usize = 256;

/// Holds the single-flight drain flag for the lifetime of a cycle.
///
/// The flag is released on drop, whichever way the cycle ends.
#[derive(Debug)]
pub struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    /// Take the flag, or return `None` if a cycle is already running.
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives drain cycles against a [`RemoteService`].
pub struct SyncDispatcher {
    store: RecordStore,
    queue: SyncQueue,
    remote: Arc<dyn RemoteService>,
    events: broadcast::Sender<SyncEvent>,
    draining: AtomicBool,
    /// Completion time of the last cycle, 0 if none yet
    last_synced_at: AtomicU64,
}

impl SyncDispatcher {
    pub fn new(store: RecordStore, queue: SyncQueue, remote: Arc<dyn RemoteService>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            queue,
            remote,
            events,
            draining: AtomicBool::new(false),
            last_synced_at: AtomicU64::new(0),
        }
    }

    /// Subscribe to sync events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn last_synced_at(&self) -> Option<Timestamp> {
        match self.last_synced_at.load(Ordering::Acquire) {
            0 => None,
            at => Some(at),
        }
    }

    /// Run one drain cycle.
    ///
    /// Returns `None` without doing anything when offline or when another
    /// cycle is in flight.
    pub async fn drain(&self) -> Result<Option<DrainReport>> {
        if !self.store.is_online() {
            tracing::debug!("Offline; drain skipped");
            return Ok(None);
        }
        let Some(_guard) = DrainGuard::try_acquire(&self.draining) else {
            tracing::debug!("Drain already in progress; trigger ignored");
            return Ok(None);
        };

        let mut pending = self.queue.pending().await?;
        drain_order(&mut pending);

        let mut gate = CreateGate::from_pending(&pending);
        let mut id_map = db::load_id_map(self.store.pool()).await?;
        let mut report = DrainReport::default();

        tracing::info!(pending = pending.len(), "Drain cycle started");

        for item in pending {
            if gate.blocks(&item) {
                tracing::debug!(
                    queue_id = item.queue_id,
                    collection = %item.collection,
                    entity_id = %item.entity_id,
                    "Deferred behind unsettled create"
                );
                report.deferred += 1;
                continue;
            }

            let outgoing = translate(&item, &id_map);
            let outcome = self.remote.send(&outgoing).await;
            report.processed += 1;

            match classify(&outgoing, outcome, self.store.now()) {
                Disposition::Synced {
                    canonical,
                    assigned_id,
                } => {
                    self.apply_success(&outgoing, canonical, assigned_id.as_deref())
                        .await?;
                    if let Some(canonical_id) = assigned_id {
                        id_map.insert(&item.collection, &outgoing.entity_id, canonical_id);
                    }
                    if item.operation == OperationKind::Create {
                        gate.settle(&item.collection, &item.entity_id);
                    }
                    report.synced += 1;
                    self.emit(SyncEvent::Synced {
                        queue_id: item.queue_id,
                        operation: item.operation,
                        collection: outgoing.collection.clone(),
                        entity_id: outgoing.entity_id.clone(),
                    });
                }
                Disposition::Conflicted(conflict) => {
                    let mut tx = self.store.pool().begin().await?;
                    let conflict_id = db::insert_conflict(&mut *tx, &conflict).await?;
                    db::delete_queue_item(&mut *tx, item.queue_id).await?;
                    tx.commit().await?;

                    if item.operation == OperationKind::Create {
                        gate.settle(&item.collection, &item.entity_id);
                    }
                    tracing::warn!(
                        queue_id = item.queue_id,
                        conflict_id,
                        collection = %conflict.collection,
                        entity_id = %conflict.entity_id,
                        "Conflict detected"
                    );
                    report.conflicts += 1;
                    self.emit(SyncEvent::Conflict {
                        conflict_id,
                        collection: conflict.collection,
                        entity_id: conflict.entity_id,
                    });
                }
                Disposition::Failed { reason } => {
                    match self.queue.record_failure(item.queue_id).await? {
                        Some(AttemptOutcome::Retry { attempts }) => {
                            tracing::warn!(
                                queue_id = item.queue_id,
                                attempts,
                                max_attempts = item.max_attempts,
                                reason = %reason,
                                "Sync failed; will retry on next drain"
                            );
                            report.retried += 1;
                        }
                        Some(AttemptOutcome::Exhausted { attempts }) => {
                            tracing::error!(
                                queue_id = item.queue_id,
                                operation = %item.operation,
                                collection = %item.collection,
                                entity_id = %item.entity_id,
                                attempts,
                                reason = %reason,
                                "Sync permanently failed; intent dropped"
                            );
                            report.dropped += 1;
                            self.emit(SyncEvent::Dropped {
                                queue_id: item.queue_id,
                                operation: item.operation,
                                collection: item.collection.clone(),
                                entity_id: item.entity_id.clone(),
                                attempts,
                                reason,
                            });
                        }
                        None => {
                            tracing::debug!(queue_id = item.queue_id, "Intent vanished mid-cycle");
                        }
                    }
                }
            }
        }

        self.last_synced_at
            .store(self.store.now().max(1), Ordering::Release);
        tracing::info!(
            processed = report.processed,
            synced = report.synced,
            conflicts = report.conflicts,
            retried = report.retried,
            dropped = report.dropped,
            deferred = report.deferred,
            "Drain cycle finished"
        );
        self.emit(SyncEvent::DrainFinished(report.clone()));

        Ok(Some(report))
    }

    /// Remove a synced intent and reconcile the local record, atomically.
    async fn apply_success(
        &self,
        item: &SyncQueueItem,
        canonical: Option<serde_json::Value>,
        assigned_id: Option<&str>,
    ) -> Result<()> {
        let now = self.store.now();
        let mut tx = self.store.pool().begin().await?;
        db::delete_queue_item(&mut *tx, item.queue_id).await?;

        match (item.operation, canonical) {
            (OperationKind::Delete, _) => {
                db::delete_record(&mut *tx, &item.collection, &item.entity_id).await?;
                tracing::debug!(
                    collection = %item.collection,
                    entity_id = %item.entity_id,
                    "Tombstone purged"
                );
            }
            (_, Some(payload)) => {
                match db::get_record(&mut *tx, &item.collection, &item.entity_id).await? {
                    Some(mut record) => {
                        record.replace_payload(payload);
                        record.stamp(now, false);
                        if let Some(canonical_id) = assigned_id {
                            db::delete_record(&mut *tx, &item.collection, &item.entity_id)
                                .await?;
                            db::insert_mapping(
                                &mut *tx,
                                &item.collection,
                                &item.entity_id,
                                canonical_id,
                                now,
                            )
                            .await?;
                            record = record.rekey(canonical_id);
                            tracing::info!(
                                collection = %item.collection,
                                temp_id = %item.entity_id,
                                canonical_id,
                                "Record re-keyed to server id"
                            );
                        }
                        db::upsert_record(&mut *tx, &record).await?;
                    }
                    None => {
                        if let Some(canonical_id) = assigned_id {
                            db::insert_mapping(
                                &mut *tx,
                                &item.collection,
                                &item.entity_id,
                                canonical_id,
                                now,
                            )
                            .await?;
                        }
                        tracing::debug!(
                            collection = %item.collection,
                            entity_id = %item.entity_id,
                            "Synced record no longer stored locally"
                        );
                    }
                }
            }
            (_, None) => {}
        }

        tx.commit().await?;
        tracing::debug!(
            queue_id = item.queue_id,
            operation = %item.operation,
            collection = %item.collection,
            entity_id = %item.entity_id,
            "Intent synced"
        );
        Ok(())
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for SyncDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDispatcher")
            .field("draining", &self.is_draining())
            .field("last_synced_at", &self.last_synced_at())
            .finish()
    }
}

/// Copy of `item` addressed by its current id.
///
/// A payload `id` field still carrying the temporary id is rewritten too.
fn translate(item: &SyncQueueItem, id_map: &IdMap) -> SyncQueueItem {
    let resolved = id_map.resolve(&item.collection, &item.entity_id);
    let mut outgoing = item.clone();
    if resolved == item.entity_id {
        return outgoing;
    }

    if let Some(serde_json::Value::Object(fields)) = outgoing.payload.as_mut() {
        if fields.get("id").and_then(serde_json::Value::as_str) == Some(item.entity_id.as_str()) {
            fields.insert("id".into(), serde_json::Value::String(resolved.to_string()));
        }
    }
    tracing::debug!(
        queue_id = item.queue_id,
        temp_id = %item.entity_id,
        canonical_id = resolved,
        "Intent translated to server id"
    );
    outgoing.entity_id = resolved.to_string();
    outgoing
}

/// Consume drain triggers until every [`crate::queue::SyncTrigger`] is gone.
///
/// Triggers that pile up while a cycle runs are collapsed into one follow-up
/// cycle.
pub async fn run_trigger_worker(dispatcher: Arc<SyncDispatcher>, mut triggers: TriggerReceiver) {
    while triggers.recv().await.is_some() {
        while triggers.try_recv().is_ok() {}

        if let Err(e) = dispatcher.drain().await {
            tracing::error!(error = %e, "Drain cycle aborted");
        }
    }
    tracing::debug!("Sync trigger worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinisync_engine::{NewQueueItem, Priority};
    use serde_json::json;

    #[test]
    fn drain_guard_is_single_flight() {
        let flag = AtomicBool::new(false);

        let guard = DrainGuard::try_acquire(&flag);
        assert!(guard.is_some());
        assert!(DrainGuard::try_acquire(&flag).is_none());

        drop(guard);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(DrainGuard::try_acquire(&flag).is_some());
    }

    #[test]
    fn drain_guard_releases_on_panic() {
        let flag = AtomicBool::new(false);
        let result = std::panic::catch_unwind(|| {
            let _guard = DrainGuard::try_acquire(&flag);
            panic!("cycle blew up");
        });

        assert!(result.is_err());
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn translate_rewrites_id_and_payload() {
        let item = SyncQueueItem::from_new(
            2,
            NewQueueItem::new(
                OperationKind::Update,
                "patients",
                "temp_1_a",
                Some(json!({"id": "temp_1_a", "name": "Ama"})),
                Priority::Normal,
                1_000,
            ),
        );
        let mut map = IdMap::new();
        map.insert("patients", "temp_1_a", "srv-1");

        let outgoing = translate(&item, &map);
        assert_eq!(outgoing.entity_id, "srv-1");
        assert_eq!(outgoing.payload, Some(json!({"id": "srv-1", "name": "Ama"})));
        assert_eq!(outgoing.queue_id, item.queue_id);

        let untouched = translate(&item, &IdMap::new());
        assert_eq!(untouched, item);
    }
}
