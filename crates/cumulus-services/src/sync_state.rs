//! Sync state store — last-known (size, mtime) per locally observed file.
//!
//! Shared between the scanner, the command handler and the status reporter.
//! Each update overwrites the whole entry for its key, so a lost update to a
//! single key is harmless; the map itself stays consistent under concurrent
//! inserts and iteration.

use std::fs::Metadata;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

/// On-disk identity of a file at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub size: u64,
    pub modified: SystemTime,
}

impl FileStamp {
    pub fn from_metadata(meta: &Metadata) -> std::io::Result<Self> {
        Ok(Self {
            size: meta.len(),
            modified: meta.modified()?,
        })
    }
}

/// Cached state for one file, as of the end of its last completed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    pub file_size: u64,
    pub last_modified: SystemTime,
    pub in_sync: bool,
}

impl SyncStatus {
    /// Status recorded after every chunk of `stamp` went out.
    pub fn synced(stamp: FileStamp) -> Self {
        Self {
            file_size: stamp.size,
            last_modified: stamp.modified,
            in_sync: true,
        }
    }

    /// True iff the file on disk still has exactly the recorded size and mtime.
    pub fn matches(&self, stamp: &FileStamp) -> bool {
        self.in_sync && self.file_size == stamp.size && self.last_modified == stamp.modified
    }

    /// Modification time as milliseconds since the Unix epoch, for logging.
    pub fn modified_unix_ms(&self) -> u128 {
        self.last_modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }
}

/// File name → SyncStatus. Cheap to clone; clones share the same map.
#[derive(Clone, Default)]
pub struct SyncStateStore {
    entries: Arc<DashMap<String, SyncStatus>>,
}

impl SyncStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file_name: &str) -> Option<SyncStatus> {
        self.entries.get(file_name).map(|e| *e.value())
    }

    /// Insert or fully overwrite the entry for `file_name`.
    pub fn put(&self, file_name: impl Into<String>, status: SyncStatus) {
        self.entries.insert(file_name.into(), status);
    }

    pub fn remove(&self, file_name: &str) -> Option<SyncStatus> {
        self.entries.remove(file_name).map(|(_, status)| status)
    }

    /// Whether the cached entry matches what is on disk now.
    pub fn is_in_sync(&self, file_name: &str, stamp: &FileStamp) -> bool {
        self.get(file_name).is_some_and(|s| s.matches(stamp))
    }

    /// Point-in-time copy of every entry, ordered by file name.
    pub fn snapshot(&self) -> Vec<(String, SyncStatus)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
