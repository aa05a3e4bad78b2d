//! Error taxonomy shared by the client and server engines.
//!
//! Every variant is handled inside the worker that hit it. None of them
//! stop a loop except `Interrupted`, which is a clean exit.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use cumulus_core::{DecodeError, WireError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Send or receive on the datagram socket failed.
    #[error("{op} failed: {source}")]
    Transport {
        op: &'static str,
        peer: Option<SocketAddr>,
        #[source]
        source: std::io::Error,
    },

    /// Inbound datagram matched neither message shape.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Missing file, permission failure, disk full.
    #[error("filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A local value could not be put on the wire.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// A decoded chunk that the storage directory refuses to apply.
    #[error("rejected chunk {block} of {file_name}: {reason}")]
    InvalidChunk {
        file_name: String,
        block: u64,
        reason: String,
    },

    /// Worker shutdown observed mid-operation.
    #[error("interrupted by shutdown")]
    Interrupted,
}

impl SyncError {
    pub(crate) fn fs(path: &Path, source: std::io::Error) -> Self {
        SyncError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}
