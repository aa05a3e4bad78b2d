//! Server engine — applies received chunks and commands to the storage
//! directory.
//!
//! One loop receives datagrams and applies each to disk before taking the
//! next. Chunks are written at `block_number * chunk_size` into the target
//! file, which is opened without truncation so blocks may land in any order
//! and duplicates rewrite the same bytes. The final-flagged chunk sets the
//! file length, trimming leftovers from a longer earlier version.

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use cumulus_core::wire::validate_file_name;
use cumulus_core::{Chunk, Command, Message, Verb};

use crate::error::SyncError;
use crate::net::{send_message, RECV_BUFFER_LEN};

/// What applying one message did to the storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Deleted { file_name: String, existed: bool },
    Written { file_name: String, block: u64, bytes: usize, is_final: bool },
    /// UPDATE sent to the server; nothing to do.
    Ignored(Command),
}

/// The server's view of its storage directory.
#[derive(Debug, Clone)]
pub struct StorageDir {
    dir: PathBuf,
    chunk_size: usize,
}

impl StorageDir {
    pub fn new(dir: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            dir: dir.into(),
            chunk_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub async fn apply(&self, message: &Message) -> Result<Applied, SyncError> {
        match message {
            Message::Chunk(chunk) => self.write_chunk(chunk).await,
            Message::Command(cmd) => match cmd.verb {
                Verb::Delete => self.delete(&cmd.file_name).await,
                Verb::Update => {
                    tracing::info!(file = %cmd.file_name, "UPDATE received by server, ignoring");
                    Ok(Applied::Ignored(cmd.clone()))
                }
            },
        }
    }

    /// Remove a stored file. Missing files are fine.
    pub async fn delete(&self, file_name: &str) -> Result<Applied, SyncError> {
        validate_file_name(file_name)?;
        let path = self.dir.join(file_name);
        let existed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(SyncError::fs(&path, e)),
        };
        tracing::info!(file = file_name, existed, "file deleted");
        Ok(Applied::Deleted {
            file_name: file_name.to_string(),
            existed,
        })
    }

    /// Write one chunk at its block offset.
    pub async fn write_chunk(&self, chunk: &Chunk) -> Result<Applied, SyncError> {
        validate_file_name(&chunk.file_name)?;
        let reject = |reason: String| SyncError::InvalidChunk {
            file_name: chunk.file_name.clone(),
            block: chunk.block_number,
            reason,
        };

        if chunk.data.len() > self.chunk_size {
            return Err(reject(format!(
                "payload {} bytes exceeds chunk size {}",
                chunk.data.len(),
                self.chunk_size
            )));
        }
        let offset = chunk
            .offset(self.chunk_size)
            .ok_or_else(|| reject("block offset overflows".into()))?;
        let end = offset
            .checked_add(chunk.data.len() as u64)
            .ok_or_else(|| reject("block end overflows".into()))?;
        if !chunk.is_final && chunk.data.len() != self.chunk_size {
            tracing::debug!(
                file = %chunk.file_name,
                block = chunk.block_number,
                bytes = chunk.data.len(),
                "short non-final chunk"
            );
        }

        let path = self.dir.join(&chunk.file_name);
        let fs_err = |e| SyncError::fs(&path, e);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(fs_err)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(fs_err)?;
        file.write_all(&chunk.data).await.map_err(fs_err)?;
        file.flush().await.map_err(fs_err)?;
        if chunk.is_final {
            file.set_len(end).await.map_err(fs_err)?;
        }

        // Informational only: does this block look like the file's last one?
        if let Ok(meta) = file.metadata().await {
            let last = last_block(meta.len(), self.chunk_size);
            if chunk.block_number == last {
                tracing::debug!(file = %chunk.file_name, block = chunk.block_number, "file received");
            } else {
                tracing::debug!(
                    file = %chunk.file_name,
                    block = chunk.block_number,
                    last_on_disk = last,
                    "file still assembling"
                );
            }
        }

        tracing::debug!(
            file = %chunk.file_name,
            block = chunk.block_number,
            offset,
            bytes = chunk.data.len(),
            is_final = chunk.is_final,
            "chunk written"
        );
        if chunk.is_final {
            tracing::info!(file = %chunk.file_name, size = end, "final chunk written");
        }

        Ok(Applied::Written {
            file_name: chunk.file_name.clone(),
            block: chunk.block_number,
            bytes: chunk.data.len(),
            is_final: chunk.is_final,
        })
    }
}

/// Index of the last block a file of `len` bytes spans.
fn last_block(len: u64, chunk_size: usize) -> u64 {
    len.div_ceil(chunk_size as u64).saturating_sub(1)
}

/// Sends server-issued commands to clients over the server's own socket.
#[derive(Clone)]
pub struct CommandSender {
    socket: Arc<UdpSocket>,
}

impl CommandSender {
    pub async fn send_command(&self, to: SocketAddr, command: &Command) -> Result<(), SyncError> {
        send_message(&self.socket, to, &Message::Command(command.clone())).await?;
        tracing::info!(%to, %command, "command sent to client");
        Ok(())
    }
}

pub struct StorageServer {
    socket: Arc<UdpSocket>,
    storage: StorageDir,
    shutdown: broadcast::Receiver<()>,
}

impl StorageServer {
    pub fn new(
        socket: Arc<UdpSocket>,
        storage: StorageDir,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            storage,
            shutdown,
        }
    }

    pub fn command_sender(&self) -> CommandSender {
        CommandSender {
            socket: self.socket.clone(),
        }
    }

    /// Push a DELETE or UPDATE to a client endpoint.
    pub async fn send_command(&self, to: SocketAddr, command: &Command) -> Result<(), SyncError> {
        self.command_sender().send_command(to, command).await
    }

    pub fn storage(&self) -> &StorageDir {
        &self.storage
    }

    pub async fn run(mut self) -> Result<(), SyncError> {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        tracing::info!(
            addr = ?self.socket.local_addr().ok(),
            storage_dir = %self.storage.path().display(),
            "storage server starting"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("storage server shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => self.handle_datagram(&buf[..len], peer).await,
                        Err(e) => tracing::warn!(error = %e, "recv_from failed"),
                    }
                }
            }
        }
    }

    /// Decode and apply one datagram. Failures are logged and dropped.
    pub async fn handle_datagram(&self, bytes: &[u8], peer: SocketAddr) {
        let message = match Message::decode(bytes) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(%peer, len = bytes.len(), error = %e, "undecodable datagram, dropping");
                return;
            }
        };
        if let Err(e) = self.storage.apply(&message).await {
            tracing::warn!(%peer, error = %e, "failed to apply message");
        }
    }
}
