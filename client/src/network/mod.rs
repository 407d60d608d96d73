//! Connectivity tracking: transport events, liveness probe and listeners.

mod listeners;
mod monitor;
mod probe;

pub use listeners::{ListenerId, StatusCallback, StatusListeners};
pub use monitor::{Connectivity, NetworkMonitor, ProbeSettings};
pub use probe::{HttpProbe, LivenessProbe};
