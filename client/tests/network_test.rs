//! Connectivity monitor tests.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use clinisync_client::network::{NetworkMonitor, ProbeSettings};
use common::FakeProbe;

fn recorder(monitor: &NetworkMonitor) -> Arc<Mutex<Vec<bool>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    monitor.on_status_change(move |online| sink.lock().unwrap().push(online));
    seen
}

#[tokio::test]
async fn test_listeners_fire_only_on_transitions() {
    let probe = FakeProbe::new(true);
    let monitor = NetworkMonitor::new(true, probe.clone(), ProbeSettings::default());
    let seen = recorder(&monitor);

    assert!(!monitor.set_transport_status(true));
    assert!(monitor.set_transport_status(false));
    assert!(!monitor.set_transport_status(false));
    assert!(!monitor.is_online());

    // Probe confirms reachability
    assert!(monitor.probe_once().await);
    assert!(monitor.is_online());
    assert!(monitor.probe_once().await);

    assert_eq!(*seen.lock().unwrap(), vec![false, true]);
}

#[tokio::test]
async fn test_failed_probe_takes_monitor_offline() {
    let probe = FakeProbe::new(false);
    let monitor = NetworkMonitor::new(true, probe.clone(), ProbeSettings::default());
    let seen = recorder(&monitor);

    assert!(!monitor.probe_once().await);
    assert!(!monitor.is_online());
    assert_eq!(*seen.lock().unwrap(), vec![false]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_probe_counts_as_offline() {
    let probe = FakeProbe::new(true);
    probe.set_delay(Duration::from_secs(60));
    let settings = ProbeSettings {
        interval: Duration::from_secs(30),
        timeout: Duration::from_secs(5),
    };
    let monitor = NetworkMonitor::new(true, probe.clone(), settings);

    assert!(!monitor.probe_once().await);
    assert!(!monitor.is_online());
}

#[tokio::test]
async fn test_removed_listener_is_not_called() {
    let probe = FakeProbe::new(true);
    let monitor = NetworkMonitor::new(true, probe, ProbeSettings::default());

    let seen = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&seen);
    let id = monitor.on_status_change(move |_| *sink.lock().unwrap() += 1);
    assert_eq!(monitor.listener_count(), 1);

    monitor.set_transport_status(false);
    assert!(monitor.remove_status_listener(id));
    assert!(!monitor.remove_status_listener(id));
    monitor.set_transport_status(true);

    assert_eq!(*seen.lock().unwrap(), 1);
    assert_eq!(monitor.listener_count(), 0);
}

#[tokio::test]
async fn test_connectivity_view_follows_monitor() {
    let probe = FakeProbe::new(true);
    let monitor = NetworkMonitor::new(false, probe, ProbeSettings::default());
    let mut view = monitor.connectivity();
    assert!(!view.is_online());

    let waiter = tokio::spawn(async move {
        let online = view.changed().await;
        (online, view.is_online())
    });
    tokio::task::yield_now().await;
    monitor.set_transport_status(true);

    let (online, now) = waiter.await.unwrap();
    assert!(online);
    assert!(now);
}

#[tokio::test(start_paused = true)]
async fn test_probe_loop_tracks_reachability() {
    let probe = FakeProbe::new(true);
    let settings = ProbeSettings {
        interval: Duration::from_secs(30),
        timeout: Duration::from_secs(5),
    };
    let monitor = NetworkMonitor::new_shared(false, probe.clone(), settings);
    let seen = recorder(&monitor);

    let task = monitor.spawn_probe_loop();

    // The first probe runs immediately
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(monitor.is_online());

    probe.set(false);
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!monitor.is_online());

    task.abort();
    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
}

#[test]
fn test_concurrent_transitions_notify_in_order() {
    let monitor = NetworkMonitor::new(true, FakeProbe::new(true), ProbeSettings::default());
    let seen = recorder(&monitor);

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let monitor = &monitor;
            scope.spawn(move || {
                for step in 0..200 {
                    monitor.set_transport_status((worker + step) % 2 == 0);
                }
            });
        }
    });

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(!seen[0]);
    assert!(seen.windows(2).all(|pair| pair[0] != pair[1]));
    assert_eq!(*seen.last().unwrap(), monitor.is_online());
}
