//! Database operations for the sync_queue table.

use clinisync_engine::{NewQueueItem, QueueId, SyncQueueItem};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Row, SqliteExecutor};

/// A stored queue row from the database.
#[derive(Debug)]
pub struct StoredQueueItem {
    pub queue_id: i64,
    pub operation: String,
    pub collection: String,
    pub entity_id: String,
    pub payload: Option<serde_json::Value>,
    pub priority: String,
    pub enqueued_at: i64,
    pub attempts: i64,
    pub max_attempts: i64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredQueueItem {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let payload: Option<Json<serde_json::Value>> = row.try_get("payload")?;
        Ok(StoredQueueItem {
            queue_id: row.try_get("queue_id")?,
            operation: row.try_get("operation")?,
            collection: row.try_get("collection")?,
            entity_id: row.try_get("entity_id")?,
            payload: payload.map(|Json(value)| value),
            priority: row.try_get("priority")?,
            enqueued_at: row.try_get("enqueued_at")?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
        })
    }
}

impl StoredQueueItem {
    /// Convert database row to an engine queue item.
    pub fn into_item(self) -> Result<SyncQueueItem, sqlx::Error> {
        let operation = self
            .operation
            .parse()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let priority = self
            .priority
            .parse()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(SyncQueueItem {
            queue_id: self.queue_id,
            operation,
            collection: self.collection,
            entity_id: self.entity_id,
            payload: self.payload,
            priority,
            enqueued_at: self.enqueued_at as u64,
            attempts: self.attempts as u32,
            max_attempts: self.max_attempts as u32,
        })
    }
}

/// Append an intent. Returns the queue id assigned to it.
pub async fn insert_queue_item(
    executor: impl SqliteExecutor<'_>,
    item: &NewQueueItem,
) -> Result<QueueId, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO sync_queue (
            operation, collection, entity_id, payload, priority,
            enqueued_at, attempts, max_attempts
        )
        VALUES ($1, $2, $3, $4, $5, $6, 0, $7)
        "#,
    )
    .bind(item.operation.as_str())
    .bind(&item.collection)
    .bind(&item.entity_id)
    .bind(item.payload.as_ref().map(Json))
    .bind(item.priority.as_str())
    .bind(item.enqueued_at as i64)
    .bind(i64::from(item.max_attempts))
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Insert an intent under its existing queue id (snapshot import).
pub async fn restore_queue_item(
    executor: impl SqliteExecutor<'_>,
    item: &SyncQueueItem,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_queue (
            queue_id, operation, collection, entity_id, payload, priority,
            enqueued_at, attempts, max_attempts
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(item.queue_id)
    .bind(item.operation.as_str())
    .bind(&item.collection)
    .bind(&item.entity_id)
    .bind(item.payload.as_ref().map(Json))
    .bind(item.priority.as_str())
    .bind(item.enqueued_at as i64)
    .bind(i64::from(item.attempts))
    .bind(i64::from(item.max_attempts))
    .execute(executor)
    .await?;

    Ok(())
}

/// Get a queued intent by id.
pub async fn get_queue_item(
    executor: impl SqliteExecutor<'_>,
    queue_id: QueueId,
) -> Result<Option<SyncQueueItem>, sqlx::Error> {
    sqlx::query_as::<_, StoredQueueItem>(
        r#"
        SELECT queue_id, operation, collection, entity_id, payload, priority,
               enqueued_at, attempts, max_attempts
        FROM sync_queue
        WHERE queue_id = $1
        "#,
    )
    .bind(queue_id)
    .fetch_optional(executor)
    .await?
    .map(StoredQueueItem::into_item)
    .transpose()
}

/// Get all pending intents in insertion order.
pub async fn get_pending_items(
    executor: impl SqliteExecutor<'_>,
) -> Result<Vec<SyncQueueItem>, sqlx::Error> {
    sqlx::query_as::<_, StoredQueueItem>(
        r#"
        SELECT queue_id, operation, collection, entity_id, payload, priority,
               enqueued_at, attempts, max_attempts
        FROM sync_queue
        ORDER BY queue_id ASC
        "#,
    )
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(StoredQueueItem::into_item)
    .collect()
}

/// Persist a new attempt count.
pub async fn update_attempts(
    executor: impl SqliteExecutor<'_>,
    queue_id: QueueId,
    attempts: u32,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE sync_queue SET attempts = $1 WHERE queue_id = $2")
        .bind(i64::from(attempts))
        .bind(queue_id)
        .execute(executor)
        .await?;

    Ok(())
}

/// Remove an intent. Returns whether a row was removed.
pub async fn delete_queue_item(
    executor: impl SqliteExecutor<'_>,
    queue_id: QueueId,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sync_queue WHERE queue_id = $1")
        .bind(queue_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Count pending intents.
pub async fn count_pending_items(executor: impl SqliteExecutor<'_>) -> Result<u64, sqlx::Error> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_queue")
        .fetch_one(executor)
        .await?;

    Ok(count.0 as u64)
}
