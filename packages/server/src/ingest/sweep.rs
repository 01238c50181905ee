//! Retention for finished uploads.
//!
//! Sessions and their logs are kept for a configured window (24 hours by
//! default) and then deleted by a background task spawned at startup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use super::store::SessionStore;

/// Periodically delete upload sessions (and their logs) older than `retention`.
pub async fn run_retention_sweep(
    store: Arc<dyn SessionStore>,
    retention: Duration,
    sweep_interval: Duration,
) {
    info!(
        retention_secs = retention.as_secs(),
        sweep_interval_secs = sweep_interval.as_secs(),
        "Starting upload retention sweep"
    );

    let mut interval = tokio::time::interval(sweep_interval);

    loop {
        interval.tick().await;
        sweep_once(store.as_ref(), retention).await;
    }
}

/// One pass of the sweep. Returns the number of sessions removed.
pub async fn sweep_once(store: &dyn SessionStore, retention: Duration) -> u64 {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
        return 0;
    };

    match store.purge_older_than(cutoff).await {
        Ok(0) => 0,
        Ok(removed) => {
            info!(removed, "Purged expired upload sessions");
            removed
        }
        Err(e) => {
            error!(error = %e, "Upload retention sweep failed");
            0
        }
    }
}
