//! Client engine — keeps a local directory mirrored on the storage server.
//!
//! Four workers run side by side and share only the sync state store:
//!   - scanner: periodic diff of the directory against the store, sends
//!     changed files chunk by chunk
//!   - command listener: DELETE/UPDATE requests arriving on the client port
//!   - deletion watcher: filesystem delete events become DELETE commands
//!   - status reporter: periodic dump of the store
//!
//! Shutdown is a broadcast; every worker selects on it next to its blocking
//! call, so a worker parked in `recv_from` wakes immediately. Once all
//! workers return, the last handle to the socket drops and the port is freed.

pub mod commands;
pub mod deletion;
pub mod scanner;
pub mod status;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use cumulus_core::config::CumulusConfig;
use cumulus_core::{Command, Message, Verb};

use crate::chunker::Chunker;
use crate::error::SyncError;
use crate::fs_watch::FsEvent;
use crate::net::send_message;
use crate::sync_state::{FileStamp, SyncStateStore, SyncStatus};

pub use commands::CommandListener;
pub use deletion::DeletionWatcher;
pub use scanner::Scanner;
pub use status::{StatusReporter, StatusSummary};

/// Inputs the client engine reads at startup.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub sync_dir: PathBuf,
    pub server: SocketAddr,
    pub chunk_size: usize,
    pub scan_interval: Duration,
    pub status_interval: Duration,
}

impl ClientSettings {
    pub fn from_config(config: &CumulusConfig) -> Self {
        Self {
            sync_dir: config.client.sync_dir.clone(),
            server: config.server_endpoint(),
            chunk_size: config.transfer.chunk_size,
            scan_interval: config.scan_interval(),
            status_interval: config.status_interval(),
        }
    }
}

/// What a handled command did locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// DELETE: whether the file was still present.
    Deleted { existed: bool },
    /// UPDATE: number of chunks retransmitted.
    Resent { chunks: usize },
}

/// State shared by every client worker. Cheap to clone.
#[derive(Clone)]
pub struct ClientContext {
    socket: Arc<UdpSocket>,
    server: SocketAddr,
    sync_dir: Arc<Path>,
    store: SyncStateStore,
    chunker: Chunker,
}

impl ClientContext {
    pub fn new(
        socket: Arc<UdpSocket>,
        server: SocketAddr,
        sync_dir: impl Into<PathBuf>,
        store: SyncStateStore,
        chunker: Chunker,
    ) -> Self {
        Self {
            socket,
            server,
            sync_dir: Arc::from(sync_dir.into()),
            store,
            chunker,
        }
    }

    pub fn store(&self) -> &SyncStateStore {
        &self.store
    }

    pub fn sync_dir(&self) -> &Path {
        &self.sync_dir
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Send one message to the server.
    pub async fn send(&self, message: &Message) -> Result<(), SyncError> {
        send_message(&self.socket, self.server, message).await?;
        Ok(())
    }

    /// Split `data` and send every chunk to the server, in block order.
    ///
    /// Checks for shutdown between chunks. Returns the number of chunks sent.
    pub async fn send_chunks(
        &self,
        file_name: &str,
        data: Bytes,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<usize, SyncError> {
        let chunks = self.chunker.split(file_name, data)?;
        let mut sent = 0;
        for chunk in chunks {
            if shutdown_requested(shutdown) {
                return Err(SyncError::Interrupted);
            }
            let block = chunk.block_number;
            let bytes = chunk.data.len();
            self.send(&Message::Chunk(chunk)).await?;
            tracing::trace!(file = file_name, block, bytes, "chunk sent");
            sent += 1;
        }
        Ok(sent)
    }

    /// Read a file from the sync directory in full.
    pub async fn read_file(&self, file_name: &str) -> Result<Bytes, SyncError> {
        let path = self.sync_dir.join(file_name);
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| SyncError::fs(&path, e))
    }

    /// Send a file whose on-disk stamp was `stamp`, then record it as synced.
    ///
    /// The store is only touched after the last chunk is out; a failure part
    /// way through leaves the file out of sync for the next scan to retry.
    pub async fn sync_file(
        &self,
        file_name: &str,
        stamp: FileStamp,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<usize, SyncError> {
        let data = self.read_file(file_name).await?;
        let chunks = self.send_chunks(file_name, data, shutdown).await?;
        self.store.put(file_name, SyncStatus::synced(stamp));
        tracing::info!(
            file = file_name,
            bytes = stamp.size,
            chunks,
            "file synced"
        );
        Ok(chunks)
    }

    /// Forget a file. The next scan treats it as new if it reappears.
    pub fn evict(&self, file_name: &str) -> Option<SyncStatus> {
        let removed = self.store.remove(file_name);
        tracing::debug!(file = file_name, had_entry = removed.is_some(), "sync state evicted");
        removed
    }

    /// Apply a server-issued DELETE or UPDATE to the local directory.
    pub async fn apply_command(
        &self,
        command: &Command,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<CommandOutcome, SyncError> {
        match command.verb {
            Verb::Delete => {
                let path = self.sync_dir.join(&command.file_name);
                let existed = match tokio::fs::remove_file(&path).await {
                    Ok(()) => true,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                    Err(e) => return Err(SyncError::fs(&path, e)),
                };
                self.evict(&command.file_name);
                tracing::info!(file = %command.file_name, existed, "file deleted locally");
                Ok(CommandOutcome::Deleted { existed })
            }
            Verb::Update => {
                let data = self.read_file(&command.file_name).await?;
                let chunks = self
                    .send_chunks(&command.file_name, data, shutdown)
                    .await?;
                tracing::info!(file = %command.file_name, chunks, "file resent on request");
                Ok(CommandOutcome::Resent { chunks })
            }
        }
    }
}

/// True once a shutdown has been broadcast or the sender is gone.
pub(crate) fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(
        shutdown.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    )
}

/// A configured client ready to start its workers.
pub struct SyncClient {
    ctx: ClientContext,
    scan_interval: Duration,
    status_interval: Duration,
}

impl SyncClient {
    pub fn new(
        socket: Arc<UdpSocket>,
        settings: ClientSettings,
        store: SyncStateStore,
    ) -> Result<Self, SyncError> {
        let chunker = Chunker::new(settings.chunk_size)?;
        Ok(Self {
            ctx: ClientContext::new(socket, settings.server, settings.sync_dir, store, chunker),
            scan_interval: settings.scan_interval,
            status_interval: settings.status_interval,
        })
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    /// Start all four workers. `fs_events` feeds the deletion watcher.
    pub fn spawn(self, fs_events: mpsc::UnboundedReceiver<FsEvent>) -> ClientHandle {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let tasks = vec![
            (
                "scanner",
                tokio::spawn(
                    Scanner::new(self.ctx.clone(), self.scan_interval, shutdown_tx.subscribe())
                        .run(),
                ),
            ),
            (
                "command listener",
                tokio::spawn(CommandListener::new(self.ctx.clone(), shutdown_tx.subscribe()).run()),
            ),
            (
                "deletion watcher",
                tokio::spawn(
                    DeletionWatcher::new(self.ctx.clone(), fs_events, shutdown_tx.subscribe())
                        .run(),
                ),
            ),
            (
                "status reporter",
                tokio::spawn(
                    StatusReporter::new(
                        self.ctx.store.clone(),
                        self.status_interval,
                        shutdown_tx.subscribe(),
                    )
                    .run(),
                ),
            ),
        ];

        tracing::info!(
            sync_dir = %self.ctx.sync_dir.display(),
            server = %self.ctx.server,
            "client workers started"
        );

        ClientHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

/// Running client. Dropping it closes the shutdown channel, which also stops
/// every worker, but only `shutdown` waits for them to finish.
pub struct ClientHandle {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<Result<(), SyncError>>)>,
}

impl ClientHandle {
    /// Stop every worker and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        for (name, task) in self.tasks {
            match task.await {
                Ok(Ok(())) => tracing::debug!(worker = name, "worker stopped"),
                Ok(Err(e)) => tracing::warn!(worker = name, error = %e, "worker failed"),
                Err(e) => tracing::error!(worker = name, error = %e, "worker panicked"),
            }
        }
        tracing::info!("client stopped");
    }
}
