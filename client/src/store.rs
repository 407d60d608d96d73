//! Durable record store.
//!
//! Keyed storage of domain entities on top of SQLite. Every write is a single
//! statement, so no partial write is ever observable. Writes are stamped with
//! the clock and with the connectivity state at the time of the write.

use std::sync::Arc;

use clinisync_engine::{Clock, LocalRecord, RecordId, StoreSnapshot, Timestamp};

use crate::db::{self, Pool};
use crate::error::Result;
use crate::network::Connectivity;

/// SQLite-backed storage shared by the queue, dispatcher and conflict manager.
#[derive(Clone)]
pub struct RecordStore {
    pool: Pool,
    connectivity: Connectivity,
    clock: Arc<dyn Clock>,
}

impl RecordStore {
    pub fn new(pool: Pool, connectivity: Connectivity, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            connectivity,
            clock,
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Upsert a record, stamping `last_modified` and `is_offline` first.
    ///
    /// Returns the record as written.
    pub async fn save(&self, mut record: LocalRecord) -> Result<LocalRecord> {
        record.stamp(self.now(), !self.is_online());
        db::upsert_record(&self.pool, &record).await?;

        tracing::debug!(
            collection = %record.collection,
            id = %record.id,
            offline = record.is_offline,
            "Record saved"
        );
        Ok(record)
    }

    /// Get a record, tombstoned or not.
    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<LocalRecord>> {
        Ok(db::get_record(&self.pool, collection, id).await?)
    }

    /// Get every record of a collection, tombstones included.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<LocalRecord>> {
        Ok(db::get_records_in_collection(&self.pool, collection).await?)
    }

    /// Get the records of a collection that satisfy `predicate`.
    pub async fn get_all_where<P>(&self, collection: &str, predicate: P) -> Result<Vec<LocalRecord>>
    where
        P: Fn(&LocalRecord) -> bool,
    {
        let mut records = self.get_all(collection).await?;
        records.retain(|record| predicate(record));
        Ok(records)
    }

    /// Hard-remove a record. Returns whether it existed.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let removed = db::delete_record(&self.pool, collection, id).await?;
        if removed {
            tracing::debug!(collection, id, "Record removed");
        }
        Ok(removed)
    }

    /// The id a record is currently stored under.
    ///
    /// Temporary ids that the server has replaced resolve to the canonical id;
    /// every other id resolves to itself.
    pub async fn resolve_id(&self, collection: &str, id: &str) -> Result<RecordId> {
        let map = db::load_id_map(&self.pool).await?;
        Ok(map.resolve(collection, id).to_string())
    }

    /// Capture everything the device holds.
    pub async fn export_snapshot(&self) -> Result<StoreSnapshot> {
        let mut snapshot = StoreSnapshot::new(self.now());
        for record in db::get_all_records(&self.pool).await? {
            snapshot.add_record(record);
        }
        snapshot.queue = db::get_pending_items(&self.pool).await?;
        snapshot.conflicts = db::get_all_conflicts(&self.pool).await?;
        snapshot.id_map = db::load_id_map(&self.pool).await?;
        Ok(snapshot)
    }

    /// Replace the whole store with the contents of a snapshot.
    pub async fn import_snapshot(&self, snapshot: &StoreSnapshot) -> Result<()> {
        snapshot.validate()?;

        let mut tx = self.pool.begin().await?;
        db::clear_tables(&mut tx).await?;
        for record in snapshot.records() {
            db::upsert_record(&mut *tx, record).await?;
        }
        for item in &snapshot.queue {
            db::restore_queue_item(&mut *tx, item).await?;
        }
        for conflict in &snapshot.conflicts {
            db::restore_conflict(&mut *tx, conflict).await?;
        }
        for (collection, temp_id, canonical_id) in snapshot.id_map.iter() {
            db::insert_mapping(&mut *tx, collection, temp_id, canonical_id, snapshot.exported_at)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(
            records = snapshot.record_count(),
            pending = snapshot.queue.len(),
            conflicts = snapshot.conflicts.len(),
            "Snapshot imported"
        );
        Ok(())
    }

    /// Wipe every table.
    pub async fn clear_all(&self) -> Result<()> {
        db::clear_all(&self.pool).await?;
        tracing::info!("Local store cleared");
        Ok(())
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("online", &self.is_online())
            .field("clock", &self.clock)
            .finish()
    }
}
