//! Clinisync - offline-first sync client for hospital records.
//!
//! Opens the local store, starts connectivity monitoring and the sync worker,
//! and logs status transitions and sync events until interrupted.

use clinisync_client::{Config, SyncContext, SyncEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinisync=info,clinisync_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        api = %config.api_url,
        database = %config.database_url,
        "Starting Clinisync client"
    );

    let context = SyncContext::from_config(&config).await?;

    let status_listener = context.monitor().on_status_change(|online| {
        if online {
            tracing::info!("Back online; pending changes will sync");
        } else {
            tracing::warn!("Offline; changes are kept locally");
        }
    });

    let mut events = context.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::Conflict {
                    conflict_id,
                    collection,
                    entity_id,
                }) => {
                    tracing::warn!(conflict_id, %collection, %entity_id, "Conflict needs resolution");
                }
                Ok(SyncEvent::Dropped {
                    queue_id,
                    collection,
                    entity_id,
                    reason,
                    ..
                }) => {
                    tracing::error!(queue_id, %collection, %entity_id, %reason, "Change will not be synced");
                }
                Ok(SyncEvent::DrainFinished(report)) => {
                    tracing::info!(?report, "Sync finished");
                }
                Ok(SyncEvent::Synced { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event log lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let status = context.status().await?;
    tracing::info!(
        online = status.online,
        pending = status.pending_count,
        conflicts = status.conflict_count,
        "Status"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    context.monitor().remove_status_listener(status_listener);
    event_log.abort();
    context.shutdown().await;

    Ok(())
}
