//! Writes accepted previews to disk.
//!
//! At most one write per `(file_path, workspace_name)` is in flight: starting
//! a new one cancels the previous write for the same key and waits for it to
//! settle before touching the file. Content goes to a temporary sibling first
//! and is renamed into place, so a cancelled write never leaves a
//! half-written target.

use crate::errors::EngineError;
use crate::models::{EditKey, FileInPreview};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum WriteOp {
    Write { path: PathBuf, content: String },
    Delete { path: PathBuf },
    Move { from: PathBuf, to: PathBuf, content: String },
}

impl WriteOp {
    fn from_preview(preview: &FileInPreview) -> Self {
        if preview.edit.is_deleted {
            return WriteOp::Delete {
                path: preview.absolute_path.clone(),
            };
        }
        match &preview.old_absolute_path {
            Some(from) if *from != preview.absolute_path => WriteOp::Move {
                from: from.clone(),
                to: preview.absolute_path.clone(),
                content: preview.proposed_content.clone(),
            },
            _ => WriteOp::Write {
                path: preview.absolute_path.clone(),
                content: preview.proposed_content.clone(),
            },
        }
    }

    fn target(&self) -> &Path {
        match self {
            WriteOp::Write { path, .. } | WriteOp::Delete { path } => path,
            WriteOp::Move { to, .. } => to,
        }
    }

    async fn run(self, id: u64, cancelled: &AtomicBool) -> Result<(), EngineError> {
        let target = self.target().to_path_buf();
        let check = || {
            if cancelled.load(Ordering::Acquire) {
                Err(EngineError::WriteCancelled { path: target.clone() })
            } else {
                Ok(())
            }
        };
        check()?;
        match self {
            WriteOp::Write { path, content } => write_staged(&path, &content, id, check).await,
            WriteOp::Delete { path } => remove_if_exists(&path).await,
            WriteOp::Move { from, to, content } => {
                write_staged(&to, &content, id, check).await?;
                remove_if_exists(&from).await
            }
        }
    }
}

/// The newest write for a key.
struct Slot {
    id: u64,
    cancelled: Arc<AtomicBool>,
    /// Resolves once the write task has ended, however it ended.
    done: oneshot::Receiver<()>,
}

type InFlight = Arc<Mutex<HashMap<EditKey, Slot>>>;

/// Serializes writes per edit key.
#[derive(Default, Clone)]
pub struct ApplyCoordinator {
    in_flight: InFlight,
    next_id: Arc<AtomicU64>,
}

/// A write that has been started but not awaited.
pub struct PendingWrite {
    key: EditKey,
    id: u64,
    path: PathBuf,
    handle: JoinHandle<Result<(), EngineError>>,
    in_flight: InFlight,
}

impl ApplyCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts writing `preview`, cancelling any unfinished write for the
    /// same key. The new write waits for the cancelled one to settle. Must
    /// be called from within a tokio runtime.
    pub fn begin(&self, preview: &FileInPreview) -> PendingWrite {
        let key = preview.edit.key();
        let op = WriteOp::from_preview(preview);
        let path = op.target().to_path_buf();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = in_flight.remove(&key).map(|slot| {
            log::debug!("Cancelling write #{} to `{}`", slot.id, path.display());
            slot.cancelled.store(true, Ordering::Release);
            slot.done
        });
        in_flight.insert(
            key.clone(),
            Slot {
                id,
                cancelled: Arc::clone(&cancelled),
                done: done_rx,
            },
        );
        drop(in_flight);

        let handle = tokio::spawn(async move {
            let _done = done_tx;
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            op.run(id, &cancelled).await
        });

        PendingWrite {
            key,
            id,
            path,
            handle,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    pub async fn apply(&self, preview: &FileInPreview) -> Result<(), EngineError> {
        self.begin(preview).finish().await
    }
}

impl PendingWrite {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for the write. A write superseded by a newer one for the same
    /// key reports `WriteCancelled`.
    pub async fn finish(self) -> Result<(), EngineError> {
        let result = match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(EngineError::WriteCancelled {
                path: self.path.clone(),
            }),
            Err(e) => Err(EngineError::io(&self.path, std::io::Error::other(e.to_string()))),
        };

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.get(&self.key).is_some_and(|slot| slot.id == self.id) {
            in_flight.remove(&self.key);
        }
        result
    }
}

/// Stages `content` in a sibling named after write `id`, then renames it
/// over `path` if `proceed` still allows it.
async fn write_staged(
    path: &Path,
    content: &str,
    id: u64,
    proceed: impl Fn() -> Result<(), EngineError>,
) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| EngineError::io(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.{}.patchwork-tmp", file_name, id));
    fs::write(&tmp_path, content)
        .await
        .map_err(|e| EngineError::io(&tmp_path, e))?;
    if let Err(e) = proceed() {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(EngineError::io(path, e));
    }
    log::debug!("Wrote {}", path.display());
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<(), EngineError> {
    match fs::remove_file(path).await {
        Ok(()) => {
            log::debug!("Deleted {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EditPayload, ParsedEdit};

    fn preview(root: &Path, path: &str, content: &str) -> FileInPreview {
        FileInPreview {
            edit: ParsedEdit {
                file_path: path.to_string(),
                workspace_name: None,
                payload: EditPayload::Whole {
                    content: content.to_string(),
                },
                is_new: false,
                is_deleted: false,
                is_renamed: false,
                old_path: None,
            },
            absolute_path: root.join(path),
            old_absolute_path: None,
            original_content: None,
            proposed_content: content.to_string(),
            is_checked: true,
            lines_added: 0,
            lines_removed: 0,
            is_fallback: false,
            diff_fallback_method: None,
            is_replaced: false,
        }
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = ApplyCoordinator::new();
        coordinator
            .apply(&preview(dir.path(), "deep/nested/a.txt", "hi\n"))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("deep/nested/a.txt")).unwrap(),
            "hi\n"
        );
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("deep/nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("a.txt")]);
    }

    #[tokio::test]
    async fn test_newer_write_for_same_key_aborts_older() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = ApplyCoordinator::new();

        // The current-thread runtime has not polled the first task yet.
        let first = coordinator.begin(&preview(dir.path(), "a.txt", "first"));
        let second = coordinator.begin(&preview(dir.path(), "a.txt", "second"));
        let other = coordinator.begin(&preview(dir.path(), "b.txt", "other"));

        assert!(matches!(first.finish().await, Err(EngineError::WriteCancelled { .. })));
        second.finish().await.unwrap();
        other.finish().await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "second");
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "other");
        assert!(coordinator.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_superseded_writes_never_land_after_newer_ones() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = ApplyCoordinator::new();
        let big = "x".repeat(1 << 20);

        let pending: Vec<PendingWrite> = (0..20)
            .map(|i| coordinator.begin(&preview(dir.path(), "a.txt", &format!("{}{}", i, big))))
            .collect();
        let mut results = Vec::new();
        for write in pending {
            results.push(write.finish().await);
        }

        assert!(results.last().unwrap().is_ok());
        for result in &results[..results.len() - 1] {
            assert!(matches!(result, Ok(()) | Err(EngineError::WriteCancelled { .. })));
        }
        let written = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert!(written.starts_with("19x"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert!(coordinator.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_move() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gone.txt"), "x").unwrap();
        std::fs::write(dir.path().join("old.txt"), "moved\n").unwrap();
        let coordinator = ApplyCoordinator::new();

        let mut delete = preview(dir.path(), "gone.txt", "");
        delete.edit.is_deleted = true;
        coordinator.apply(&delete).await.unwrap();
        assert!(!dir.path().join("gone.txt").exists());
        coordinator.apply(&delete).await.unwrap();

        let mut rename = preview(dir.path(), "new.txt", "moved\n");
        rename.edit.is_renamed = true;
        rename.old_absolute_path = Some(dir.path().join("old.txt"));
        coordinator.apply(&rename).await.unwrap();
        assert!(!dir.path().join("old.txt").exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("new.txt")).unwrap(), "moved\n");
    }
}
