//! Filesystem change events for the synced directory.
//!
//! Wraps a `notify` watcher and turns its callbacks into a channel of
//! per-file events that one worker consumes. Events for different files
//! arrive in no particular order.

use std::path::Path;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Modified,
    Deleted,
}

/// One change to one file directly inside the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub file_name: String,
}

impl FsEvent {
    pub fn deleted(file_name: impl Into<String>) -> Self {
        Self {
            kind: FsEventKind::Deleted,
            file_name: file_name.into(),
        }
    }
}

/// Keeps the OS watch alive. Dropping it ends the event stream.
pub struct DirWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch `dir` (non-recursively) and stream its change events.
pub fn watch_dir(dir: &Path) -> notify::Result<(DirWatcher, mpsc::UnboundedReceiver<FsEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let Some(kind) = map_event_kind(&event.kind) else {
                return;
            };
            for path in &event.paths {
                let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let _ = tx.send(FsEvent {
                    kind,
                    file_name: file_name.to_string(),
                });
            }
        }
        Err(e) => tracing::warn!(error = %e, "filesystem watch error"),
    })?;

    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    tracing::info!(dir = %dir.display(), "watching for filesystem changes");

    Ok((DirWatcher { _watcher: watcher }, rx))
}

/// A rename away from the directory counts as a deletion of the old name.
fn map_event_kind(kind: &EventKind) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(_) => Some(FsEventKind::Created),
        EventKind::Remove(_) => Some(FsEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FsEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FsEventKind::Created),
        EventKind::Modify(_) => Some(FsEventKind::Modified),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use std::time::Duration;

    #[test]
    fn maps_notify_kinds() {
        assert_eq!(
            map_event_kind(&EventKind::Create(CreateKind::File)),
            Some(FsEventKind::Created)
        );
        assert_eq!(
            map_event_kind(&EventKind::Remove(RemoveKind::File)),
            Some(FsEventKind::Deleted)
        );
        assert_eq!(
            map_event_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            Some(FsEventKind::Modified)
        );
        assert_eq!(
            map_event_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(FsEventKind::Deleted)
        );
        assert_eq!(map_event_kind(&EventKind::Access(AccessKind::Any)), None);
    }

    #[tokio::test]
    async fn reports_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        std::fs::write(&path, b"x").unwrap();

        let (_watcher, mut rx) = watch_dir(dir.path()).unwrap();
        std::fs::remove_file(&path).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let event = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .expect("no delete event within 5s")
                .expect("watch channel closed");
            if event == FsEvent::deleted("gone.txt") {
                break;
            }
        }
    }
}
