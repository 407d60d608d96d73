//! Database module for SQLite persistence.

mod conflicts;
mod id_map;
mod pool;
mod queue;
mod records;

pub use conflicts::*;
pub use id_map::*;
pub use pool::*;
pub use queue::*;
pub use records::*;

use sqlx::SqliteConnection;

/// Remove every row from every table.
pub async fn clear_tables(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for table in ["records", "sync_queue", "conflicts", "id_map"] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Remove every row from every table in one transaction.
pub async fn clear_all(pool: &Pool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    clear_tables(&mut tx).await?;
    tx.commit().await
}
