//! Scanner — periodic diff of the sync directory against the store.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use cumulus_core::wire::validate_file_name;

use super::ClientContext;
use crate::error::SyncError;
use crate::sync_state::FileStamp;

pub struct Scanner {
    ctx: ClientContext,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl Scanner {
    pub fn new(ctx: ClientContext, interval: Duration, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            ctx,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<(), SyncError> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("scanner shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    match scan_once(&self.ctx, &mut self.shutdown).await {
                        Ok(0) => {}
                        Ok(synced) => tracing::debug!(synced, "scan complete"),
                        Err(SyncError::Interrupted) => {
                            tracing::info!("scanner interrupted mid-transfer");
                            return Ok(());
                        }
                        Err(e) => tracing::warn!(error = %e, "scan failed"),
                    }
                }
            }
        }
    }
}

/// One pass over the sync directory. Sends every regular file whose
/// (size, mtime) differs from the store and returns how many were sent.
///
/// A failure on one file is logged and the pass moves on to the next.
pub async fn scan_once(
    ctx: &ClientContext,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<usize, SyncError> {
    let dir = ctx.sync_dir();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| SyncError::fs(dir, e))?;

    let mut synced = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(SyncError::fs(dir, e)),
        };

        let path = entry.path();
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "stat failed, skipping");
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }

        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::warn!(path = %path.display(), "file name is not UTF-8, skipping");
            continue;
        };
        if let Err(e) = validate_file_name(&file_name) {
            tracing::debug!(error = %e, "file name cannot be synced, skipping");
            continue;
        }

        let stamp = match FileStamp::from_metadata(&meta) {
            Ok(stamp) => stamp,
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "no modification time, skipping");
                continue;
            }
        };

        if ctx.store().is_in_sync(&file_name, &stamp) {
            tracing::trace!(file = %file_name, "in sync");
            continue;
        }

        tracing::info!(file = %file_name, bytes = stamp.size, "syncing file");
        match ctx.sync_file(&file_name, stamp, shutdown).await {
            Ok(_) => synced += 1,
            Err(SyncError::Interrupted) => return Err(SyncError::Interrupted),
            Err(e) => tracing::warn!(file = %file_name, error = %e, "sync failed"),
        }
    }

    Ok(synced)
}
