//! Shared fixtures for client integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clinisync_client::db;
use clinisync_client::dispatcher::SyncDispatcher;
use clinisync_client::network::{LivenessProbe, NetworkMonitor, ProbeSettings};
use clinisync_client::queue::{SyncQueue, SyncTrigger, TriggerReceiver};
use clinisync_client::{
    ConflictManager, ContextOptions, DataService, RecordStore, RemoteService, SyncContext,
    SyncError, SyncEvent,
};
use clinisync_engine::{ManualClock, OperationKind, RemoteOutcome, SyncQueueItem};
use serde_json::Value;
use tokio::sync::{broadcast, Notify};

/// Remote that answers from a script and records every call.
///
/// Once the script is empty every call succeeds, echoing the sent payload
/// as the canonical one.
#[derive(Default)]
pub struct FakeRemote {
    script: Mutex<VecDeque<RemoteOutcome>>,
    calls: Mutex<Vec<SyncQueueItem>>,
    hold: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
    listing: Mutex<Option<Vec<Value>>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: RemoteOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<SyncQueueItem> {
        self.calls.lock().unwrap().clone()
    }

    /// What `fetch_all` returns; `None` makes it fail.
    pub fn set_listing(&self, listing: Option<Vec<Value>>) {
        *self.listing.lock().unwrap() = listing;
    }

    /// Collections fetched so far.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    /// Block the next call until released.
    ///
    /// Returns `(entered, release)`: `entered` is notified once the call is
    /// in flight, notifying `release` lets it finish.
    pub fn hold_next(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some((Arc::clone(&entered), Arc::clone(&release)));
        (entered, release)
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn send(&self, item: &SyncQueueItem) -> RemoteOutcome {
        self.calls.lock().unwrap().push(item.clone());

        let hold = self.hold.lock().unwrap().take();
        if let Some((entered, release)) = hold {
            entered.notify_one();
            release.notified().await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| match item.operation {
            OperationKind::Delete => RemoteOutcome::Success { canonical: None },
            OperationKind::Create | OperationKind::Update => RemoteOutcome::Success {
                canonical: item.payload.clone(),
            },
        })
    }

    async fn fetch_all(&self, collection: &str) -> clinisync_client::Result<Vec<Value>> {
        self.fetches.lock().unwrap().push(collection.to_string());
        self.listing
            .lock()
            .unwrap()
            .clone()
            .ok_or(SyncError::RemoteStatus(503))
    }
}

/// Probe with a switchable answer and an optional delay.
#[derive(Default)]
pub struct FakeProbe {
    reachable: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeProbe {
    pub fn new(reachable: bool) -> Arc<Self> {
        let probe = Self::default();
        probe.set(reachable);
        Arc::new(probe)
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl LivenessProbe for FakeProbe {
    async fn check(&self) -> bool {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.reachable.load(Ordering::SeqCst)
    }
}

pub async fn memory_pool() -> db::Pool {
    let pool = db::create_memory_pool().await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

/// Components wired by hand, without a trigger worker, so tests decide when
/// a drain runs.
pub struct Rig {
    pub monitor: Arc<NetworkMonitor>,
    pub store: RecordStore,
    pub queue: SyncQueue,
    pub dispatcher: Arc<SyncDispatcher>,
    pub conflicts: ConflictManager,
    pub data: DataService,
    pub remote: Arc<FakeRemote>,
    pub probe: Arc<FakeProbe>,
    pub clock: Arc<ManualClock>,
    pub triggers: TriggerReceiver,
}

impl Rig {
    pub async fn new(online: bool) -> Self {
        let remote = FakeRemote::new();
        let probe = FakeProbe::new(online);
        let clock = Arc::new(ManualClock::new(1_000));
        let monitor = NetworkMonitor::new_shared(online, probe.clone(), ProbeSettings::default());

        let store = RecordStore::new(memory_pool().await, monitor.connectivity(), clock.clone());
        let (trigger, triggers) = SyncTrigger::channel();
        let queue = SyncQueue::new(store.clone(), trigger, 3);
        let dispatcher = Arc::new(SyncDispatcher::new(
            store.clone(),
            queue.clone(),
            remote.clone(),
        ));
        let conflicts = ConflictManager::new(store.clone(), queue.clone());
        let data = DataService::new(store.clone(), queue.clone(), remote.clone());

        Self {
            monitor,
            store,
            queue,
            dispatcher,
            conflicts,
            data,
            remote,
            probe,
            clock,
            triggers,
        }
    }

    /// Number of drain requests fired since the last call.
    pub fn take_triggers(&mut self) -> usize {
        let mut count = 0;
        while self.triggers.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

/// A full context with the trigger worker running and the probe loop off.
pub struct Harness {
    pub context: SyncContext,
    pub remote: Arc<FakeRemote>,
    pub probe: Arc<FakeProbe>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn start(online: bool) -> Self {
        let remote = FakeRemote::new();
        let probe = FakeProbe::new(online);
        let clock = Arc::new(ManualClock::new(1_000));

        let mut options = ContextOptions::new(remote.clone(), probe.clone());
        options.clock = clock.clone();
        options.start_online = online;
        options.spawn_probe = false;

        let context = SyncContext::start(memory_pool().await, options).await.unwrap();
        Self {
            context,
            remote,
            probe,
            clock,
        }
    }
}

/// Wait for the next `DrainFinished` event, skipping others.
pub async fn next_drain(events: &mut broadcast::Receiver<SyncEvent>) -> Option<SyncEvent> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event @ SyncEvent::DrainFinished(_)) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .ok()
        .flatten()
}
