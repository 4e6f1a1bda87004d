//! OS file notifications, collected into batches.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tessera_build::{ChangeEvent, Op};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::error::WatchError;

/// Receiving ends of a [`Batcher`].
pub struct BatchStreams {
    pub events: mpsc::Receiver<Vec<ChangeEvent>>,
    pub errors: mpsc::UnboundedReceiver<notify::Error>,
}

/// Owns the OS watch handle and the task that flushes batches every `interval`.
///
/// Clones share the same handle; [`Batcher::close`] on any of them stops everything.
#[derive(Clone)]
pub struct Batcher {
    watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
    task: AbortHandle,
}

impl Batcher {
    /// Must be called from within a tokio runtime.
    pub fn new(interval: Duration) -> Result<(Self, BatchStreams), WatchError> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<ChangeEvent>();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::channel(16);

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let Some(op) = op_for(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        let _ = raw_tx.send(ChangeEvent::new(path, op));
                    }
                }
                Err(e) => {
                    let _ = error_tx.send(e);
                }
            }
        })
        .map_err(WatchError::Init)?;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut pending: Vec<ChangeEvent> = Vec::new();

            loop {
                tokio::select! {
                    event = raw_rx.recv() => match event {
                        Some(event) => pending.push(event),
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if pending.is_empty() {
                            continue;
                        }
                        let batch = std::mem::take(&mut pending);
                        if batch_tx.send(batch).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let batcher = Self {
            watcher: Arc::new(Mutex::new(Some(watcher))),
            task: task.abort_handle(),
        };
        let streams = BatchStreams {
            events: batch_rx,
            errors: error_rx,
        };
        Ok((batcher, streams))
    }

    /// Watch `path` (a directory or a single file), not recursively.
    pub fn add(&self, path: &Path) -> Result<(), WatchError> {
        let mut guard = self.watcher.lock().unwrap_or_else(|e| e.into_inner());
        let Some(watcher) = guard.as_mut() else {
            return Err(WatchError::Closed);
        };
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Add {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Release the OS handle and stop batching.
    pub fn close(&self) {
        self.watcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.task.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

/// Map a notify event kind to the ops the build understands.
pub fn op_for(kind: &EventKind) -> Option<Op> {
    match kind {
        EventKind::Create(_) => Some(Op::CREATE),
        EventKind::Remove(_) => Some(Op::REMOVE),
        EventKind::Modify(ModifyKind::Name(_)) => Some(Op::RENAME),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(Op::CHMOD),
        EventKind::Modify(_) | EventKind::Any => Some(Op::WRITE),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RenameMode};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn maps_event_kinds() {
        assert_eq!(op_for(&EventKind::Create(CreateKind::File)), Some(Op::CREATE));
        assert_eq!(
            op_for(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(Op::WRITE)
        );
        assert_eq!(
            op_for(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(Op::RENAME)
        );
        assert_eq!(
            op_for(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            Some(Op::CHMOD)
        );
        assert_eq!(op_for(&EventKind::Other), None);
    }

    #[tokio::test]
    async fn delivers_batches() {
        let temp = tempdir().unwrap();
        let (batcher, mut streams) = Batcher::new(Duration::from_millis(50)).unwrap();
        batcher.add(temp.path()).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(temp.path().join("a.md"), "# A").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(3), streams.events.recv()).await;

        assert!(batch.is_ok(), "timeout waiting for a batch");
        let batch = batch.unwrap().expect("channel should not be closed");
        assert!(batch.iter().any(|e| e.path.ends_with("a.md")));
        batcher.close();
    }

    #[tokio::test]
    async fn closed_batcher_refuses_paths() {
        let temp = tempdir().unwrap();
        let (batcher, _streams) = Batcher::new(Duration::from_millis(50)).unwrap();

        batcher.close();

        assert!(batcher.is_closed());
        assert!(matches!(batcher.add(temp.path()), Err(WatchError::Closed)));
    }
}
