//! Status listener registry.
//!
//! Tracks callbacks interested in connectivity transitions. Each registration
//! returns a [`ListenerId`] that is the only handle needed to unregister.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

/// Callback invoked with the new connectivity state.
pub type StatusCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Stable handle for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(uuid::Uuid);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Thread-safe set of status listeners.
#[derive(Default)]
pub struct StatusListeners {
    listeners: DashMap<ListenerId, StatusCallback>,
}

impl StatusListeners {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
        }
    }

    /// Register a listener.
    ///
    /// Returns the listener ID.
    pub fn register(&self, callback: StatusCallback) -> ListenerId {
        let id = ListenerId(uuid::Uuid::new_v4());
        self.listeners.insert(id, callback);

        tracing::debug!(listener_id = %id, "Status listener registered");

        id
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            tracing::debug!(listener_id = %id, "Status listener unregistered");
        }
        removed
    }

    /// Call every listener with the new state.
    ///
    /// Callbacks run after the registry lock is released, so a callback may
    /// register or unregister listeners itself.
    ///
    /// Returns the number of listeners notified.
    pub fn notify(&self, online: bool) -> usize {
        let callbacks: Vec<StatusCallback> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for callback in &callbacks {
            callback(online);
        }

        callbacks.len()
    }

    /// Get the number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for StatusListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusListeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_unregister() {
        let listeners = StatusListeners::new();

        let id = listeners.register(Arc::new(|_| {}));
        assert_eq!(listeners.len(), 1);

        assert!(listeners.unregister(id));
        assert!(listeners.is_empty());
        assert!(!listeners.unregister(id));
    }

    #[test]
    fn test_notify_reaches_every_listener() {
        let listeners = StatusListeners::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            listeners.register(Arc::new(move |online| {
                assert!(online);
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(listeners.notify(true), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_listener_can_unregister_itself() {
        let listeners = Arc::new(StatusListeners::new());
        let slot: Arc<std::sync::Mutex<Option<ListenerId>>> = Arc::default();

        let id = {
            let registry = Arc::clone(&listeners);
            let slot = Arc::clone(&slot);
            listeners.register(Arc::new(move |_| {
                if let Some(id) = slot.lock().unwrap().take() {
                    registry.unregister(id);
                }
            }))
        };
        *slot.lock().unwrap() = Some(id);

        listeners.notify(false);
        assert!(listeners.is_empty());
    }
}
