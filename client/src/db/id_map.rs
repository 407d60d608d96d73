//! Database operations for the id_map table.

use clinisync_engine::{IdMap, Timestamp};
use sqlx::SqliteExecutor;

/// Record that a temporary id was replaced by a server-assigned one.
pub async fn insert_mapping(
    executor: impl SqliteExecutor<'_>,
    collection: &str,
    temp_id: &str,
    canonical_id: &str,
    mapped_at: Timestamp,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO id_map (collection, temp_id, canonical_id, mapped_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (collection, temp_id) DO UPDATE SET
            canonical_id = excluded.canonical_id,
            mapped_at = excluded.mapped_at
        "#,
    )
    .bind(collection)
    .bind(temp_id)
    .bind(canonical_id)
    .bind(mapped_at as i64)
    .execute(executor)
    .await?;

    Ok(())
}

/// Load the whole translation table.
pub async fn load_id_map(executor: impl SqliteExecutor<'_>) -> Result<IdMap, sqlx::Error> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT collection, temp_id, canonical_id FROM id_map ORDER BY collection, temp_id",
    )
    .fetch_all(executor)
    .await?;

    let mut map = IdMap::new();
    for (collection, temp_id, canonical_id) in rows {
        map.insert(collection, temp_id, canonical_id);
    }
    Ok(map)
}
