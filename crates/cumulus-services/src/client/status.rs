//! Status reporter — periodic dump of the sync state store.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::SyncError;
use crate::sync_state::SyncStateStore;

/// Totals from one report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub files: usize,
    pub in_sync: usize,
    pub bytes: u64,
}

pub struct StatusReporter {
    store: SyncStateStore,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl StatusReporter {
    pub fn new(store: SyncStateStore, interval: Duration, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            store,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<(), SyncError> {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("status reporter shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    report(&self.store);
                }
            }
        }
    }
}

/// Log every entry of the store and return the totals.
pub fn report(store: &SyncStateStore) -> StatusSummary {
    let mut summary = StatusSummary::default();
    for (file_name, status) in store.snapshot() {
        tracing::info!(
            file = %file_name,
            in_sync = status.in_sync,
            size = status.file_size,
            modified_ms = status.modified_unix_ms() as u64,
            "  sync status"
        );
        summary.files += 1;
        summary.bytes += status.file_size;
        if status.in_sync {
            summary.in_sync += 1;
        }
    }
    tracing::info!(
        files = summary.files,
        in_sync = summary.in_sync,
        bytes = summary.bytes,
        "sync state snapshot"
    );
    summary
}
