//! # Clinisync Engine
//!
//! Deterministic rules for an offline-first record sync client.
//!
//! This crate holds everything about offline synchronization that can be
//! expressed without touching a disk, a socket or a timer: the shape of the
//! locally stored records, the queue of pending intents and the order in which
//! it drains, how a remote response is classified, how a conflict is resolved,
//! and how temporary client ids are translated once the server assigns real
//! ones. The `clinisync-client` crate wires these rules to SQLite, HTTP and
//! tokio.
//!
//! ## Design Principles
//!
//! - **No IO**: Engine has no knowledge of files, network, or platform
//! - **Deterministic**: Same inputs always produce same outputs
//! - **Opaque payloads**: Domain fields are never interpreted, only stored,
//!   compared and searched
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`LocalRecord`] is one domain entity as the device knows it: collection,
//! id, JSON payload, last local write time, whether that write happened
//! offline, and a soft-delete tombstone.
//!
//! ### Intents
//!
//! Every local write appends a [`SyncQueueItem`] describing what must be sent
//! to the server. [`drain_order`] sorts pending items by [`Priority`] first
//! and by enqueue time second, which keeps same-entity intents in the order
//! they were made.
//!
//! ### Outcomes
//!
//! The server answers each intent with one of three [`RemoteOutcome`]s.
//! [`classify`] turns the outcome into a [`Disposition`]: synced, conflicted or
//! failed. Failures count against [`SyncQueueItem::max_attempts`].
//!
//! ### Conflicts
//!
//! A [`ConflictRecord`] keeps both sides of a divergence until a person picks
//! a [`Resolution`].
//!
//! ## Quick Start
//!
//! ```rust
//! use clinisync_engine::{
//!     classify, drain_order, Disposition, NewQueueItem, OperationKind, Priority,
//!     RemoteOutcome, SyncQueueItem,
//! };
//! use serde_json::json;
//!
//! let mut items = vec![
//!     SyncQueueItem::from_new(1, NewQueueItem::new(
//!         OperationKind::Update, "patients", "p-1",
//!         Some(json!({"name": "Ama"})), Priority::Normal, 1_000,
//!     )),
//!     SyncQueueItem::from_new(2, NewQueueItem::new(
//!         OperationKind::Update, "patients", "p-2",
//!         Some(json!({"name": "Kofi"})), Priority::High, 2_000,
//!     )),
//! ];
//!
//! drain_order(&mut items);
//! assert_eq!(items[0].queue_id, 2);
//!
//! let outcome = RemoteOutcome::Conflict { server: json!({"name": "Kofi A."}) };
//! match classify(&items[0], outcome, 3_000) {
//!     Disposition::Conflicted(conflict) => assert_eq!(conflict.entity_id, "p-2"),
//!     other => panic!("unexpected disposition: {other:?}"),
//! }
//! ```

pub mod clock;
pub mod collections;
pub mod conflict;
pub mod error;
pub mod operation;
pub mod query;
pub mod reconcile;
pub mod record;
pub mod snapshot;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock};
pub use collections::CollectionMap;
pub use conflict::{field_differences, ConflictRecord, NewConflict, Resolution};
pub use error::Error;
pub use operation::{
    drain_order, AttemptOutcome, NewQueueItem, OperationKind, Priority, SyncQueueItem,
    DEFAULT_MAX_ATTEMPTS,
};
pub use query::{field_value, Page, Query};
pub use reconcile::{
    canonical_id, classify, entity_payload, unwrap_envelope, CreateGate, Disposition, IdMap,
    RemoteOutcome,
};
pub use record::{is_temporary, temp_id, LocalRecord, TEMP_ID_PREFIX};
pub use snapshot::{SnapshotMetadata, StoreSnapshot, SNAPSHOT_FORMAT_VERSION};

/// Type aliases for clarity
pub type RecordId = String;
pub type CollectionName = String;
pub type QueueId = i64;
pub type ConflictId = i64;
/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;
