//! Error types for the Clinisync engine.

use crate::{CollectionName, ConflictId, RecordId};
use thiserror::Error;

/// All possible errors from the Clinisync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Record errors
    #[error("record not found: {collection}/{id}")]
    RecordNotFound {
        collection: CollectionName,
        id: RecordId,
    },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    // Parsing errors for persisted enums
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("unknown priority: {0}")]
    UnknownPriority(String),

    #[error("unknown resolution: {0}")]
    UnknownResolution(String),

    #[error("invalid collection map entry: {0}")]
    InvalidCollectionMap(String),

    // Conflict errors
    #[error("conflict already resolved: {0}")]
    ConflictAlreadyResolved(ConflictId),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
