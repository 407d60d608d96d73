//! Unified error handling for the sync client.

use clinisync_engine::{CollectionName, ConflictId, RecordId};

/// Sync client error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Engine error: {0}")]
    Engine(#[from] clinisync_engine::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {collection}/{id}")]
    NotFound {
        collection: CollectionName,
        id: RecordId,
    },

    #[error("Conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    #[error("Conflict already resolved: {0}")]
    ConflictAlreadyResolved(ConflictId),

    #[error("Conflict {0} would resolve to an empty payload")]
    EmptyResolution(ConflictId),

    #[error("Remote responded with status {0}")]
    RemoteStatus(u16),

    #[error("Unexpected remote response: {0}")]
    UnexpectedResponse(String),
}

impl SyncError {
    pub(crate) fn not_found(collection: &str, id: &str) -> Self {
        SyncError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_convert() {
        let err: SyncError = clinisync_engine::Error::InvalidPayload("bad".into()).into();
        assert!(matches!(err, SyncError::Engine(_)));
        assert_eq!(err.to_string(), "Engine error: invalid payload: bad");
    }

    #[test]
    fn not_found_display() {
        let err = SyncError::not_found("patients", "p-1");
        assert_eq!(err.to_string(), "Not found: patients/p-1");
    }
}
