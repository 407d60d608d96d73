//! Application context.
//!
//! Builds every sync component once, wires them together and owns the
//! background tasks. Consumers receive the components from here instead of
//! reaching for globals.

use std::sync::Arc;

use clinisync_engine::{Clock, StoreSnapshot, Timestamp, DEFAULT_MAX_ATTEMPTS};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::clock::SystemClock;
use crate::config::Config;
use crate::conflicts::ConflictManager;
use crate::data_service::DataService;
use crate::db::{self, Pool};
use crate::dispatcher::{run_trigger_worker, SyncDispatcher};
use crate::error::Result;
use crate::events::{DrainReport, SyncEvent};
use crate::network::{HttpProbe, ListenerId, LivenessProbe, NetworkMonitor, ProbeSettings};
use crate::queue::{SyncQueue, SyncTrigger};
use crate::remote::{HttpRemote, RemoteService};
use crate::store::RecordStore;

/// Snapshot of the sync state for a status indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    pub pending_count: u64,
    pub conflict_count: u64,
    pub draining: bool,
    /// Completion time of the last drain cycle
    pub last_synced_at: Option<Timestamp>,
}

/// Everything needed to start a context, apart from the database.
pub struct ContextOptions {
    pub remote: Arc<dyn RemoteService>,
    pub probe: Arc<dyn LivenessProbe>,
    pub clock: Arc<dyn Clock>,
    pub start_online: bool,
    pub probe_settings: ProbeSettings,
    /// Run the periodic probe loop; disable to drive probes by hand
    pub spawn_probe: bool,
    pub max_attempts: u32,
}

impl ContextOptions {
    pub fn new(remote: Arc<dyn RemoteService>, probe: Arc<dyn LivenessProbe>) -> Self {
        Self {
            remote,
            probe,
            clock: Arc::new(SystemClock),
            start_online: true,
            probe_settings: ProbeSettings::default(),
            spawn_probe: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Owns the sync components and their background tasks.
pub struct SyncContext {
    store: RecordStore,
    monitor: Arc<NetworkMonitor>,
    queue: SyncQueue,
    dispatcher: Arc<SyncDispatcher>,
    conflicts: ConflictManager,
    data: DataService,
    trigger_listener: ListenerId,
    worker: JoinHandle<()>,
    probe_task: Option<JoinHandle<()>>,
}

impl SyncContext {
    /// Open the configured database and start with HTTP transport.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::create_pool(&config.database_url).await?;
        db::run_migrations(&pool).await?;

        let client = reqwest::Client::builder().build()?;
        let remote = HttpRemote::new(
            client.clone(),
            &config.api_url,
            config.auth_token.clone(),
            config.collections.clone(),
        );
        let probe = HttpProbe::new(client, &config.health_url);

        let mut options = ContextOptions::new(Arc::new(remote), Arc::new(probe));
        options.start_online = config.start_online;
        options.probe_settings = ProbeSettings {
            interval: config.probe_interval,
            timeout: config.probe_timeout,
        };
        options.max_attempts = config.max_attempts;

        Self::start(pool, options).await
    }

    /// Wire the components on top of a migrated pool and spawn the
    /// background tasks.
    pub async fn start(pool: Pool, options: ContextOptions) -> Result<Self> {
        let monitor = NetworkMonitor::new_shared(
            options.start_online,
            options.probe,
            options.probe_settings,
        );
        let store = RecordStore::new(pool, monitor.connectivity(), options.clock);

        let (trigger, triggers) = SyncTrigger::channel();
        let queue = SyncQueue::new(store.clone(), trigger.clone(), options.max_attempts);
        let dispatcher = Arc::new(SyncDispatcher::new(
            store.clone(),
            queue.clone(),
            Arc::clone(&options.remote),
        ));
        let conflicts = ConflictManager::new(store.clone(), queue.clone());
        let data = DataService::new(store.clone(), queue.clone(), options.remote);

        let trigger_listener = monitor.on_status_change(move |online| {
            if online {
                trigger.fire();
            }
        });
        let worker = tokio::spawn(run_trigger_worker(Arc::clone(&dispatcher), triggers));
        let probe_task = options
            .spawn_probe
            .then(|| monitor.spawn_probe_loop());

        let pending = queue.pending_count().await?;
        tracing::info!(online = monitor.is_online(), pending, "Sync context started");
        if pending > 0 {
            queue.notify();
        }

        Ok(Self {
            store,
            monitor,
            queue,
            dispatcher,
            conflicts,
            data,
            trigger_listener,
            worker,
            probe_task,
        })
    }

    pub fn data(&self) -> &DataService {
        &self.data
    }

    pub fn conflicts(&self) -> &ConflictManager {
        &self.conflicts
    }

    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<SyncDispatcher> {
        &self.dispatcher
    }

    /// Subscribe to sync events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.dispatcher.subscribe()
    }

    /// Run a drain cycle now.
    ///
    /// Returns `None` when offline or when a cycle is already in flight.
    pub async fn force_sync(&self) -> Result<Option<DrainReport>> {
        tracing::info!("Manual sync requested");
        self.dispatcher.drain().await
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        Ok(SyncStatus {
            online: self.monitor.is_online(),
            pending_count: self.queue.pending_count().await?,
            conflict_count: self.conflicts.pending_count().await?,
            draining: self.dispatcher.is_draining(),
            last_synced_at: self.dispatcher.last_synced_at(),
        })
    }

    pub async fn export_snapshot(&self) -> Result<StoreSnapshot> {
        self.store.export_snapshot().await
    }

    pub async fn import_snapshot(&self, snapshot: &StoreSnapshot) -> Result<()> {
        self.store.import_snapshot(snapshot).await?;
        self.queue.notify();
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear_all().await
    }

    /// Stop background tasks and close the database.
    pub async fn shutdown(self) {
        self.monitor.remove_status_listener(self.trigger_listener);
        if let Some(probe_task) = self.probe_task {
            probe_task.abort();
        }
        self.worker.abort();
        self.store.pool().close().await;
        tracing::info!("Sync context stopped");
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("monitor", &self.monitor)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
