//! Deletion watcher — local deletes become DELETE commands for the server.

use tokio::sync::{broadcast, mpsc};

use cumulus_core::{Command, Message};

use super::ClientContext;
use crate::error::SyncError;
use crate::fs_watch::{FsEvent, FsEventKind};

pub struct DeletionWatcher {
    ctx: ClientContext,
    events: mpsc::UnboundedReceiver<FsEvent>,
    shutdown: broadcast::Receiver<()>,
}

impl DeletionWatcher {
    pub fn new(
        ctx: ClientContext,
        events: mpsc::UnboundedReceiver<FsEvent>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            ctx,
            events,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<(), SyncError> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("deletion watcher shutting down");
                    return Ok(());
                }

                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("filesystem event source closed, deletion watcher exiting");
                        return Ok(());
                    };
                    if event.kind != FsEventKind::Deleted {
                        tracing::trace!(file = %event.file_name, kind = ?event.kind, "ignoring event");
                        continue;
                    }
                    if let Err(e) = self.handle_deleted(&event.file_name).await {
                        tracing::warn!(file = %event.file_name, error = %e, "delete propagation failed");
                    }
                }
            }
        }
    }

    /// Tell the server and evict the store entry. The local file is never
    /// touched here: if the name exists again by the time the event is
    /// handled, it is a new file and the scanner will send it.
    async fn handle_deleted(&self, file_name: &str) -> Result<(), SyncError> {
        let command = Command::delete(file_name)?;
        let path = self.ctx.sync_dir().join(file_name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(file = file_name, "file recreated since delete event, not propagating");
            return Ok(());
        }
        tracing::info!(file = file_name, "local delete detected");

        if let Err(e) = self.ctx.send(&Message::Command(command)).await {
            tracing::warn!(file = file_name, error = %e, "failed to send DELETE");
        }
        self.ctx.evict(file_name);
        Ok(())
    }
}
