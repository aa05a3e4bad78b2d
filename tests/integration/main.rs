//! Cumulus integration test harness.
//!
//! Each test runs a storage server and a sync client in-process, talking
//! over loopback UDP with their own temporary directories. Chunk sizes are
//! kept small so every envelope fits in one datagram.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use cumulus_services::fs_watch::{watch_dir, DirWatcher};
use cumulus_services::net::bind_udp;
use cumulus_services::{
    ClientHandle, ClientSettings, CommandSender, StorageDir, StorageServer, SyncClient, SyncError,
    SyncStateStore,
};

mod commands;
mod failures;
mod sync;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const CHUNK_SIZE: usize = 1024;

pub struct ServerNode {
    pub dir: TempDir,
    pub addr: SocketAddr,
    pub sender: CommandSender,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<(), SyncError>>,
}

impl ServerNode {
    pub fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        self.task.await.unwrap().unwrap();
    }
}

pub fn start_server(chunk_size: usize) -> Result<ServerNode> {
    let dir = tempfile::tempdir()?;
    let socket = Arc::new(bind_udp("127.0.0.1:0".parse()?)?);
    let addr = socket.local_addr()?;
    let (shutdown, rx) = broadcast::channel(1);

    let server = StorageServer::new(socket, StorageDir::new(dir.path(), chunk_size), rx);
    let sender = server.command_sender();
    let task = tokio::spawn(server.run());

    Ok(ServerNode {
        dir,
        addr,
        sender,
        shutdown,
        task,
    })
}

pub struct ClientNode {
    pub dir: TempDir,
    pub addr: SocketAddr,
    pub store: SyncStateStore,
    handle: ClientHandle,
    _watcher: DirWatcher,
}

impl ClientNode {
    pub fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    pub async fn stop(self) {
        self.handle.shutdown().await;
    }
}

pub fn start_client(server: SocketAddr, chunk_size: usize) -> Result<ClientNode> {
    let dir = tempfile::tempdir()?;
    let socket = Arc::new(bind_udp("127.0.0.1:0".parse()?)?);
    let addr = socket.local_addr()?;
    let store = SyncStateStore::new();

    let settings = ClientSettings {
        sync_dir: dir.path().to_path_buf(),
        server,
        chunk_size,
        scan_interval: Duration::from_millis(100),
        status_interval: Duration::from_secs(1),
    };
    let (watcher, events) = watch_dir(dir.path())?;
    let handle = SyncClient::new(socket, settings, store.clone())?.spawn(events);

    Ok(ClientNode {
        dir,
        addr,
        store,
        handle,
        _watcher: watcher,
    })
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    if check() {
        return Ok(());
    }
    bail!("condition not met within {timeout:?}")
}

/// True once `path` exists with exactly `content`.
pub fn has_content(path: &Path, content: &[u8]) -> bool {
    std::fs::read(path).map(|d| d == content).unwrap_or(false)
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 253) as u8).collect()
}

/// True once the client has recorded `name` as in sync.
pub fn synced(client: &ClientNode, name: &str) -> bool {
    client.store.get(name).map(|s| s.in_sync).unwrap_or(false)
}
