//! Database operations for the records table.

use clinisync_engine::LocalRecord;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Row, SqliteExecutor};

/// A stored record row from the database.
#[derive(Debug)]
pub struct StoredRecord {
    pub collection: String,
    pub id: String,
    pub payload: serde_json::Value,
    pub last_modified: i64,
    pub is_offline: bool,
    pub deleted: bool,
    pub deleted_at: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let Json(payload) = row.try_get("payload")?;
        Ok(StoredRecord {
            collection: row.try_get("collection")?,
            id: row.try_get("id")?,
            payload,
            last_modified: row.try_get("last_modified")?,
            is_offline: row.try_get("is_offline")?,
            deleted: row.try_get("deleted")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl StoredRecord {
    /// Convert database row to an engine record.
    pub fn into_record(self) -> LocalRecord {
        LocalRecord {
            collection: self.collection,
            id: self.id,
            payload: self.payload,
            last_modified: self.last_modified as u64,
            is_offline: self.is_offline,
            deleted: self.deleted,
            deleted_at: self.deleted_at.map(|at| at as u64),
        }
    }
}

/// Upsert a record (insert or replace by collection and id).
pub async fn upsert_record(
    executor: impl SqliteExecutor<'_>,
    record: &LocalRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO records (
            collection, id, payload, last_modified, is_offline, deleted, deleted_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (collection, id) DO UPDATE SET
            payload = excluded.payload,
            last_modified = excluded.last_modified,
            is_offline = excluded.is_offline,
            deleted = excluded.deleted,
            deleted_at = excluded.deleted_at
        "#,
    )
    .bind(&record.collection)
    .bind(&record.id)
    .bind(Json(&record.payload))
    .bind(record.last_modified as i64)
    .bind(record.is_offline)
    .bind(record.deleted)
    .bind(record.deleted_at.map(|at| at as i64))
    .execute(executor)
    .await?;

    Ok(())
}

/// Get a record by collection and ID, tombstoned or not.
pub async fn get_record(
    executor: impl SqliteExecutor<'_>,
    collection: &str,
    id: &str,
) -> Result<Option<LocalRecord>, sqlx::Error> {
    let row = sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT collection, id, payload, last_modified, is_offline, deleted, deleted_at
        FROM records
        WHERE collection = $1 AND id = $2
        "#,
    )
    .bind(collection)
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(StoredRecord::into_record))
}

/// Get all records in a collection, ordered by id.
pub async fn get_records_in_collection(
    executor: impl SqliteExecutor<'_>,
    collection: &str,
) -> Result<Vec<LocalRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT collection, id, payload, last_modified, is_offline, deleted, deleted_at
        FROM records
        WHERE collection = $1
        ORDER BY id
        "#,
    )
    .bind(collection)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(StoredRecord::into_record).collect())
}

/// Get every record of every collection.
pub async fn get_all_records(
    executor: impl SqliteExecutor<'_>,
) -> Result<Vec<LocalRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT collection, id, payload, last_modified, is_offline, deleted, deleted_at
        FROM records
        ORDER BY collection, id
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(StoredRecord::into_record).collect())
}

/// Hard-delete a record. Returns whether a row was removed.
pub async fn delete_record(
    executor: impl SqliteExecutor<'_>,
    collection: &str,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM records WHERE collection = $1 AND id = $2")
        .bind(collection)
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}
