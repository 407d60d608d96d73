//! # Clinisync Client
//!
//! Offline-first sync runtime for the hospital record app.
//!
//! Writes go to a local SQLite store first and are queued as intents. A
//! dispatcher drains the queue against the REST API whenever the device is
//! online, one cycle at a time, and turns the server's answers into local
//! updates, retries, or conflicts for a person to resolve. The rules it
//! applies live in `clinisync-engine`; this crate supplies the storage,
//! network and task plumbing.
//!
//! Start with [`SyncContext`], which builds and owns every component.

pub mod clock;
pub mod config;
pub mod conflicts;
pub mod context;
pub mod data_service;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod network;
pub mod queue;
pub mod remote;
pub mod store;

pub use clock::SystemClock;
pub use config::{Config, ConfigError};
pub use conflicts::ConflictManager;
pub use context::{ContextOptions, SyncContext, SyncStatus};
pub use data_service::DataService;
pub use dispatcher::{DrainGuard, SyncDispatcher};
pub use error::{Result, SyncError};
pub use events::{DrainReport, SyncEvent};
pub use network::{
    Connectivity, HttpProbe, ListenerId, LivenessProbe, NetworkMonitor, ProbeSettings,
};
pub use queue::{SyncQueue, SyncTrigger};
pub use remote::{HttpRemote, RemoteService};
pub use store::RecordStore;
