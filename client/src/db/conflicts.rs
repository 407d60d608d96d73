//! Database operations for the conflicts table.

use clinisync_engine::{ConflictId, ConflictRecord, NewConflict};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Row, SqliteExecutor};

/// A stored conflict row from the database.
#[derive(Debug)]
pub struct StoredConflict {
    pub conflict_id: i64,
    pub collection: String,
    pub entity_id: String,
    pub local_data: serde_json::Value,
    pub server_data: serde_json::Value,
    pub detected_at: i64,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub resolved_at: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredConflict {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let Json(local_data) = row.try_get("local_data")?;
        let Json(server_data) = row.try_get("server_data")?;
        Ok(StoredConflict {
            conflict_id: row.try_get("conflict_id")?,
            collection: row.try_get("collection")?,
            entity_id: row.try_get("entity_id")?,
            local_data,
            server_data,
            detected_at: row.try_get("detected_at")?,
            resolved: row.try_get("resolved")?,
            resolution: row.try_get("resolution")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }
}

impl StoredConflict {
    /// Convert database row to an engine conflict.
    pub fn into_conflict(self) -> Result<ConflictRecord, sqlx::Error> {
        let resolution = self
            .resolution
            .map(|r| r.parse())
            .transpose()
            .map_err(|e: clinisync_engine::Error| sqlx::Error::Decode(Box::new(e)))?;

        Ok(ConflictRecord {
            conflict_id: self.conflict_id,
            collection: self.collection,
            entity_id: self.entity_id,
            local_data: self.local_data,
            server_data: self.server_data,
            detected_at: self.detected_at as u64,
            resolved: self.resolved,
            resolution,
            resolved_at: self.resolved_at.map(|at| at as u64),
        })
    }
}

const SELECT_CONFLICTS: &str = r#"
    SELECT conflict_id, collection, entity_id, local_data, server_data,
           detected_at, resolved, resolution, resolved_at
    FROM conflicts
"#;

/// Store a newly detected conflict. Returns its id.
pub async fn insert_conflict(
    executor: impl SqliteExecutor<'_>,
    conflict: &NewConflict,
) -> Result<ConflictId, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO conflicts (
            collection, entity_id, local_data, server_data, detected_at, resolved
        )
        VALUES ($1, $2, $3, $4, $5, 0)
        "#,
    )
    .bind(&conflict.collection)
    .bind(&conflict.entity_id)
    .bind(Json(&conflict.local_data))
    .bind(Json(&conflict.server_data))
    .bind(conflict.detected_at as i64)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Insert a conflict under its existing id (snapshot import).
pub async fn restore_conflict(
    executor: impl SqliteExecutor<'_>,
    conflict: &ConflictRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO conflicts (
            conflict_id, collection, entity_id, local_data, server_data,
            detected_at, resolved, resolution, resolved_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(conflict.conflict_id)
    .bind(&conflict.collection)
    .bind(&conflict.entity_id)
    .bind(Json(&conflict.local_data))
    .bind(Json(&conflict.server_data))
    .bind(conflict.detected_at as i64)
    .bind(conflict.resolved)
    .bind(conflict.resolution.map(|r| r.as_str()))
    .bind(conflict.resolved_at.map(|at| at as i64))
    .execute(executor)
    .await?;

    Ok(())
}

/// Get a conflict by id.
pub async fn get_conflict(
    executor: impl SqliteExecutor<'_>,
    conflict_id: ConflictId,
) -> Result<Option<ConflictRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredConflict>(&format!("{SELECT_CONFLICTS} WHERE conflict_id = $1"))
        .bind(conflict_id)
        .fetch_optional(executor)
        .await?
        .map(StoredConflict::into_conflict)
        .transpose()
}

/// Get unresolved conflicts, oldest first.
pub async fn get_pending_conflicts(
    executor: impl SqliteExecutor<'_>,
) -> Result<Vec<ConflictRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredConflict>(&format!(
        "{SELECT_CONFLICTS} WHERE resolved = 0 ORDER BY conflict_id ASC"
    ))
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(StoredConflict::into_conflict)
    .collect()
}

/// Get every conflict, resolved ones included.
pub async fn get_all_conflicts(
    executor: impl SqliteExecutor<'_>,
) -> Result<Vec<ConflictRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredConflict>(&format!("{SELECT_CONFLICTS} ORDER BY conflict_id ASC"))
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(StoredConflict::into_conflict)
        .collect()
}

/// Persist the resolution fields of a conflict.
pub async fn mark_conflict_resolved(
    executor: impl SqliteExecutor<'_>,
    conflict: &ConflictRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE conflicts
        SET resolved = $1, resolution = $2, resolved_at = $3
        WHERE conflict_id = $4
        "#,
    )
    .bind(conflict.resolved)
    .bind(conflict.resolution.map(|r| r.as_str()))
    .bind(conflict.resolved_at.map(|at| at as i64))
    .bind(conflict.conflict_id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Count unresolved conflicts.
pub async fn count_pending_conflicts(
    executor: impl SqliteExecutor<'_>,
) -> Result<u64, sqlx::Error> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conflicts WHERE resolved = 0")
        .fetch_one(executor)
        .await?;

    Ok(count.0 as u64)
}
