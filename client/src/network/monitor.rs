//! Network monitor.
//!
//! Single source of truth for connectivity. State changes come from two
//! places: transport events reported by the host ([`NetworkMonitor::set_transport_status`])
//! and a periodic liveness probe. Listeners fire only on real transitions.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::listeners::{ListenerId, StatusListeners};
use super::probe::LivenessProbe;

/// Read-only view of the current connectivity state.
///
/// Cheap to clone; handed to every component that needs to know whether the
/// device is online.
#[derive(Debug, Clone)]
pub struct Connectivity {
    rx: watch::Receiver<bool>,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the state differs from the last one seen by this view.
    pub async fn changed(&mut self) -> bool {
        if self.rx.changed().await.is_err() {
            return self.is_online();
        }
        *self.rx.borrow_and_update()
    }
}

/// Probe schedule.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Tracks online/offline state and notifies listeners on transitions.
///
/// Transitions are applied one at a time, so listeners see them in the order
/// the state changed. Listeners run under that lock and must not change
/// connectivity themselves.
pub struct NetworkMonitor {
    state: watch::Sender<bool>,
    transitions: Mutex<()>,
    listeners: StatusListeners,
    probe: Arc<dyn LivenessProbe>,
    settings: ProbeSettings,
}

impl NetworkMonitor {
    /// Create a monitor starting in the transport's reported state.
    pub fn new(initial: bool, probe: Arc<dyn LivenessProbe>, settings: ProbeSettings) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            transitions: Mutex::new(()),
            listeners: StatusListeners::new(),
            probe,
            settings,
        }
    }

    /// Create a new monitor wrapped in Arc for sharing.
    pub fn new_shared(
        initial: bool,
        probe: Arc<dyn LivenessProbe>,
        settings: ProbeSettings,
    ) -> Arc<Self> {
        Arc::new(Self::new(initial, probe, settings))
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// A view of the connectivity state for other components.
    pub fn connectivity(&self) -> Connectivity {
        Connectivity {
            rx: self.state.subscribe(),
        }
    }

    /// Register a status listener.
    pub fn on_status_change<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.listeners.register(Arc::new(callback))
    }

    /// Unregister a status listener. Returns whether it was registered.
    pub fn remove_status_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Apply a transport-level online/offline signal.
    ///
    /// Returns whether the state changed.
    pub fn set_transport_status(&self, online: bool) -> bool {
        self.transition(online, "transport")
    }

    /// Run one liveness probe, bounded by the configured timeout, and apply
    /// its result. Returns the probe result.
    pub async fn probe_once(&self) -> bool {
        let reachable = match time::timeout(self.settings.timeout, self.probe.check()).await {
            Ok(reachable) => reachable,
            Err(_) => {
                tracing::debug!(timeout = ?self.settings.timeout, "Liveness probe timed out");
                false
            }
        };
        self.transition(reachable, "probe");
        reachable
    }

    /// Spawn the periodic probe loop. The first probe runs immediately.
    pub fn spawn_probe_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(monitor.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.probe_once().await;
            }
        })
    }

    fn transition(&self, online: bool, source: &'static str) -> bool {
        let _serial = self
            .transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            tracing::info!(online, source, "Connectivity changed");
            self.listeners.notify(online);
        }
        changed
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.is_online())
            .field("listeners", &self.listeners)
            .field("settings", &self.settings)
            .finish()
    }
}
