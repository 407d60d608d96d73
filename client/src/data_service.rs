//! Local-first data service.
//!
//! Every write lands in the record store first and is then queued for the
//! server, so it is visible to reads immediately whether or not the device is
//! online. Reads never touch the network and never return tombstones; only
//! [`DataService::refresh`] pulls from the server.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use clinisync_engine::{
    canonical_id, temp_id, LocalRecord, OperationKind, Page, Priority, Query, RecordId,
};

use crate::error::{Result, SyncError};
use crate::queue::SyncQueue;
use crate::remote::RemoteService;
use crate::store::RecordStore;

/// Length of the random part of a temporary id.
const TEMP_SUFFIX_LEN: usize = 9;

/// CRUD and query API over the local store.
#[derive(Clone)]
pub struct DataService {
    store: RecordStore,
    queue: SyncQueue,
    remote: Arc<dyn RemoteService>,
}

impl fmt::Debug for DataService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataService")
            .field("store", &self.store)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl DataService {
    pub fn new(store: RecordStore, queue: SyncQueue, remote: Arc<dyn RemoteService>) -> Self {
        Self {
            store,
            queue,
            remote,
        }
    }

    /// Create a record with normal priority.
    ///
    /// A string `id` in the payload is used as the record id, so callers that
    /// own their identifiers (an MRN, a bed code) keep them and the id never
    /// goes through the temporary-id mapping. Otherwise a temporary id is
    /// generated and written into the payload.
    pub async fn create(
        &self,
        collection: &str,
        payload: serde_json::Value,
    ) -> Result<LocalRecord> {
        self.create_with_priority(collection, payload, Priority::Normal)
            .await
    }

    pub async fn create_with_priority(
        &self,
        collection: &str,
        mut payload: serde_json::Value,
        priority: Priority,
    ) -> Result<LocalRecord> {
        let id = match payload.get("id").and_then(serde_json::Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = self.new_temp_id();
                if let Some(fields) = payload.as_object_mut() {
                    fields.insert("id".into(), serde_json::Value::String(id.clone()));
                }
                id
            }
        };

        let record = self
            .store
            .save(LocalRecord::new(collection, id, payload))
            .await?;
        self.queue
            .enqueue(
                OperationKind::Create,
                collection,
                &record.id,
                Some(record.payload.clone()),
                priority,
            )
            .await?;

        tracing::info!(collection, id = %record.id, "Record created");
        Ok(record)
    }

    /// Shallow-merge `partial` over a record, with normal priority.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        partial: serde_json::Value,
    ) -> Result<LocalRecord> {
        self.update_with_priority(collection, id, partial, Priority::Normal)
            .await
    }

    pub async fn update_with_priority(
        &self,
        collection: &str,
        id: &str,
        partial: serde_json::Value,
        priority: Priority,
    ) -> Result<LocalRecord> {
        let mut record = self
            .find_active(collection, id)
            .await?
            .ok_or_else(|| SyncError::not_found(collection, id))?;
        record.merge_payload(&partial)?;

        let record = self.store.save(record).await?;
        self.queue
            .enqueue(
                OperationKind::Update,
                collection,
                &record.id,
                Some(record.payload.clone()),
                priority,
            )
            .await?;

        tracing::info!(collection, id = %record.id, "Record updated");
        Ok(record)
    }

    /// Tombstone a record, with normal priority.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.delete_with_priority(collection, id, Priority::Normal)
            .await
    }

    pub async fn delete_with_priority(
        &self,
        collection: &str,
        id: &str,
        priority: Priority,
    ) -> Result<()> {
        let mut record = self
            .find_active(collection, id)
            .await?
            .ok_or_else(|| SyncError::not_found(collection, id))?;
        record.mark_deleted(self.store.now());

        let record = self.store.save(record).await?;
        self.queue
            .enqueue(OperationKind::Delete, collection, &record.id, None, priority)
            .await?;

        tracing::info!(collection, id = %record.id, "Record deleted");
        Ok(())
    }

    /// Get a live record. Temporary ids the server replaced still resolve.
    pub async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<LocalRecord>> {
        self.find_active(collection, id).await
    }

    /// Every live record of a collection.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<LocalRecord>> {
        self.store
            .get_all_where(collection, LocalRecord::is_active)
            .await
    }

    /// Pull a collection from the server into the store, then return every
    /// live record.
    ///
    /// Records with a queued intent keep their local version, and server
    /// records flagged `"deleted": true` are skipped. Offline, or when the
    /// fetch fails, this is [`DataService::get_all`].
    pub async fn refresh(&self, collection: &str) -> Result<Vec<LocalRecord>> {
        if !self.store.is_online() {
            return self.get_all(collection).await;
        }

        let items = match self.remote.fetch_all(collection).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(collection, error = %e, "Refresh failed, serving local records");
                return self.get_all(collection).await;
            }
        };

        let queued: HashSet<RecordId> = self
            .queue
            .pending()
            .await?
            .into_iter()
            .filter(|item| item.collection == collection)
            .map(|item| item.entity_id)
            .collect();

        let (mut saved, mut kept) = (0usize, 0usize);
        for item in items {
            let Some(id) = canonical_id(&item).map(str::to_string) else {
                continue;
            };
            if item.get("deleted").and_then(serde_json::Value::as_bool) == Some(true) {
                continue;
            }
            if queued.contains(&id) {
                kept += 1;
                continue;
            }
            self.store
                .save(LocalRecord::new(collection, id, item))
                .await?;
            saved += 1;
        }

        tracing::info!(collection, saved, kept, "Collection refreshed");
        self.get_all(collection).await
    }

    /// Case-insensitive substring search over `fields` (dotted paths allowed),
    /// or over the whole payload when `fields` is empty.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        fields: &[&str],
    ) -> Result<Vec<LocalRecord>> {
        let records = self.store.get_all(collection).await?;
        Ok(Query::new(&records)
            .search(query, fields)
            .all()
            .into_iter()
            .cloned()
            .collect())
    }

    /// One page of live records matching `filters`.
    pub async fn get_paginated(
        &self,
        collection: &str,
        page: usize,
        limit: usize,
        filters: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Page<LocalRecord>> {
        let records = self.store.get_all(collection).await?;
        let query = match filters {
            Some(filters) => Query::new(&records).filters(filters),
            None => Query::new(&records),
        };
        Ok(query.page(page, limit))
    }

    async fn find_active(&self, collection: &str, id: &str) -> Result<Option<LocalRecord>> {
        let id = self.store.resolve_id(collection, id).await?;
        Ok(self
            .store
            .get(collection, &id)
            .await?
            .filter(LocalRecord::is_active))
    }

    fn new_temp_id(&self) -> RecordId {
        let random = uuid::Uuid::new_v4().simple().to_string();
        temp_id(self.store.now(), &random[..TEMP_SUFFIX_LEN])
    }
}
