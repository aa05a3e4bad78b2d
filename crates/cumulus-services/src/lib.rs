//! cumulus-services — the client and server sync engines.
//! Depends on cumulus-core for the wire format and configuration.

pub mod chunker;
pub mod client;
pub mod error;
pub mod fs_watch;
pub mod net;
pub mod server;
pub mod sync_state;

pub use chunker::{Chunker, Chunks};
pub use client::{ClientContext, ClientHandle, ClientSettings, CommandOutcome, SyncClient};
pub use error::SyncError;
pub use server::{Applied, CommandSender, StorageDir, StorageServer};
pub use sync_state::{FileStamp, SyncStateStore, SyncStatus};
