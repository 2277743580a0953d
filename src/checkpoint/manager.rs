use super::backup;
use super::git::GitRepo;
use crate::errors::EngineError;
use crate::models::{Checkpoint, SessionSnapshot, WorkspaceRoot};
use fs2::FileExt;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::fs;

const LOG_FILE: &str = "checkpoints.json";
const LOCK_FILE: &str = "checkpoints.lock";
const BACKUP_DIR: &str = "backups";
const HOUR_MILLIS: i64 = 60 * 60 * 1000;
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(50);

/// Exclusive hold on a state directory's checkpoint log, released on drop.
struct LogLock {
    file: File,
}

impl LogLock {
    async fn acquire(state_dir: &Path) -> Result<LogLock, EngineError> {
        let lock_path = state_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| EngineError::io(&lock_path, e))?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(LogLock { file }),
                Err(e) if e.kind() != ErrorKind::WouldBlock => return Err(EngineError::io(&lock_path, e)),
                Err(_) if start.elapsed() >= LOCK_TIMEOUT => {
                    return Err(EngineError::io(
                        &lock_path,
                        std::io::Error::new(
                            ErrorKind::TimedOut,
                            format!(
                                "checkpoint log is held by another patchwork process ({}s)",
                                LOCK_TIMEOUT.as_secs()
                            ),
                        ),
                    ));
                }
                Err(_) => tokio::time::sleep(LOCK_RETRY).await,
            }
        }
    }
}

impl Drop for LogLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Everything needed to create a checkpoint besides the workspace state.
#[derive(Debug, Clone, Default)]
pub struct CheckpointRequest {
    pub title: String,
    pub description: Option<String>,
    pub is_temporary: bool,
    pub session: SessionSnapshot,
}

impl CheckpointRequest {
    pub fn new(title: impl Into<String>, description: Option<String>) -> Self {
        CheckpointRequest {
            title: title.into(),
            description,
            ..Default::default()
        }
    }
}

/// Owns the checkpoint log of a workspace. Mutating operations take
/// `&mut self`; hosts sharing a manager wrap it in a mutex. Other processes
/// are kept out by a file lock held for the manager's lifetime.
pub struct CheckpointManager {
    roots: Vec<WorkspaceRoot>,
    state_dir: PathBuf,
    /// Newest first.
    checkpoints: Vec<Checkpoint>,
    _lock: LogLock,
}

impl CheckpointManager {
    /// Locks and loads the log from `state_dir`, starting empty when there
    /// is none. Waits a bounded time for another process holding the lock.
    pub async fn load(roots: Vec<WorkspaceRoot>, state_dir: PathBuf) -> Result<Self, EngineError> {
        prepare_state_dir(&state_dir).await?;
        let lock = LogLock::acquire(&state_dir).await?;

        let log_path = state_dir.join(LOG_FILE);
        let mut checkpoints: Vec<Checkpoint> = match fs::read_to_string(&log_path).await {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| EngineError::invalid_data(&log_path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(EngineError::io(log_path, e)),
        };
        checkpoints.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        log::debug!("Loaded {} checkpoint(s) from {}", checkpoints.len(), state_dir.display());
        Ok(CheckpointManager {
            roots,
            state_dir,
            checkpoints,
            _lock: lock,
        })
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Checkpoints, newest first.
    pub fn list(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn get(&self, timestamp: i64) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.timestamp == timestamp)
    }

    pub async fn create(&mut self, title: &str, description: Option<&str>) -> Result<Checkpoint, EngineError> {
        self.create_with(CheckpointRequest::new(title, description.map(str::to_string)))
            .await
    }

    /// Snapshots every root and appends the checkpoint. Nothing is recorded
    /// unless every snapshot succeeded. Temporary checkpoints are replaced.
    pub async fn create_with(&mut self, request: CheckpointRequest) -> Result<Checkpoint, EngineError> {
        let timestamp = self.next_timestamp();
        let description = counted_description(self.latest_permanent(), &request.title, request.description);

        let mut git_data = BTreeMap::new();
        let mut plain_roots = Vec::new();
        for root in &self.roots {
            match self.open_repo(root).await {
                Some(repo) => match repo.snapshot(timestamp).await {
                    Ok(snapshot) => {
                        git_data.insert(root.name.clone(), snapshot);
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        self.discard_git_refs(&git_data, timestamp).await;
                        return Err(e);
                    }
                },
                None => plain_roots.push(root),
            }
        }

        let backup_dir = self.backup_dir(timestamp);
        if !plain_roots.is_empty() {
            if let Err(e) = backup::back_up(&backup_dir, &plain_roots, &self.state_dir).await {
                self.discard_git_refs(&git_data, timestamp).await;
                if let Err(cleanup) = backup::remove(&backup_dir).await {
                    log::warn!("{}", cleanup);
                }
                return Err(e);
            }
        }

        let checkpoint = Checkpoint {
            timestamp,
            title: request.title,
            description,
            is_temporary: request.is_temporary,
            is_starred: false,
            uses_git: !git_data.is_empty(),
            git_data,
            backed_up_roots: plain_roots.iter().map(|r| r.name.clone()).collect(),
            session: request.session,
        };

        let temporaries: Vec<Checkpoint> = self.checkpoints.iter().filter(|c| c.is_temporary).cloned().collect();
        self.checkpoints.retain(|c| !c.is_temporary);
        for stale in &temporaries {
            self.discard_artifacts(stale).await;
        }

        self.checkpoints.insert(0, checkpoint.clone());
        self.persist().await?;
        log::info!("Created checkpoint {} ({})", checkpoint.timestamp, checkpoint.title);
        Ok(checkpoint)
    }

    /// Returns the workspace to the state captured by `timestamp`. The
    /// checkpoint is returned so the host can restore session metadata.
    pub async fn restore(&self, timestamp: i64) -> Result<Checkpoint, EngineError> {
        let checkpoint = self
            .get(timestamp)
            .ok_or(EngineError::CheckpointNotFound(timestamp))?
            .clone();

        for (name, snapshot) in &checkpoint.git_data {
            let root = self.root(name)?;
            let repo = self
                .open_repo(root)
                .await
                .ok_or_else(|| EngineError::GitOperationFailed {
                    folder: name.clone(),
                    command: "rev-parse --show-toplevel".to_string(),
                    stderr: "not a git repository".to_string(),
                })?;
            repo.restore(snapshot).await.inspect_err(|e| log::error!("{}", e))?;
        }
        if !checkpoint.backed_up_roots.is_empty() {
            backup::restore(&self.backup_dir(timestamp), &self.state_dir).await?;
        }
        // Rewrite the log in case the restore touched the state directory.
        self.persist().await?;
        log::info!("Restored checkpoint {}", timestamp);
        Ok(checkpoint)
    }

    /// Removes checkpoints older than `lifespan_hours` that are not starred.
    /// The most recent checkpoint always survives.
    pub async fn prune(&mut self, lifespan_hours: u64) -> Result<Vec<i64>, EngineError> {
        self.prune_at(lifespan_hours, chrono::Utc::now().timestamp_millis())
            .await
    }

    pub async fn prune_at(&mut self, lifespan_hours: u64, now: i64) -> Result<Vec<i64>, EngineError> {
        let cutoff = now.saturating_sub((lifespan_hours as i64).saturating_mul(HOUR_MILLIS));
        let newest = self.checkpoints.first().map(|c| c.timestamp);
        let (expired, kept): (Vec<Checkpoint>, Vec<Checkpoint>) = self
            .checkpoints
            .drain(..)
            .partition(|c| Some(c.timestamp) != newest && !c.is_starred && c.timestamp < cutoff);
        self.checkpoints = kept;

        if expired.is_empty() {
            return Ok(Vec::new());
        }
        for checkpoint in &expired {
            self.discard_artifacts(checkpoint).await;
        }
        self.persist().await?;
        log::info!("Pruned {} checkpoint(s)", expired.len());
        Ok(expired.iter().map(|c| c.timestamp).collect())
    }

    pub async fn set_starred(&mut self, timestamp: i64, starred: bool) -> Result<(), EngineError> {
        self.get_mut(timestamp)?.is_starred = starred;
        self.persist().await
    }

    pub async fn retitle(
        &mut self,
        timestamp: i64,
        title: &str,
        description: Option<&str>,
    ) -> Result<(), EngineError> {
        let checkpoint = self.get_mut(timestamp)?;
        checkpoint.title = title.to_string();
        checkpoint.description = description.map(str::to_string);
        self.persist().await
    }

    pub async fn delete(&mut self, timestamp: i64) -> Result<Checkpoint, EngineError> {
        let index = self
            .checkpoints
            .iter()
            .position(|c| c.timestamp == timestamp)
            .ok_or(EngineError::CheckpointNotFound(timestamp))?;
        let checkpoint = self.checkpoints.remove(index);
        self.discard_artifacts(&checkpoint).await;
        self.persist().await?;
        Ok(checkpoint)
    }

    fn get_mut(&mut self, timestamp: i64) -> Result<&mut Checkpoint, EngineError> {
        self.checkpoints
            .iter_mut()
            .find(|c| c.timestamp == timestamp)
            .ok_or(EngineError::CheckpointNotFound(timestamp))
    }

    fn root(&self, name: &str) -> Result<&WorkspaceRoot, EngineError> {
        self.roots
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| EngineError::PathUnresolvable {
                path: String::new(),
                workspace: Some(name.to_string()),
            })
    }

    fn latest_permanent(&self) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| !c.is_temporary)
    }

    /// Millisecond timestamps, bumped when two checkpoints land in the same
    /// millisecond so they stay unique keys.
    fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        match self.checkpoints.iter().map(|c| c.timestamp).max() {
            Some(latest) if latest >= now => latest + 1,
            _ => now,
        }
    }

    fn backup_dir(&self, timestamp: i64) -> PathBuf {
        self.state_dir.join(BACKUP_DIR).join(timestamp.to_string())
    }

    /// Best effort: a leftover ref or backup only costs disk space.
    async fn discard_artifacts(&self, checkpoint: &Checkpoint) {
        self.discard_git_refs(&checkpoint.git_data, checkpoint.timestamp)
            .await;
        if !checkpoint.backed_up_roots.is_empty() {
            if let Err(e) = backup::remove(&self.backup_dir(checkpoint.timestamp)).await {
                log::warn!("{}", e);
            }
        }
    }

    async fn discard_git_refs<V>(&self, git_data: &BTreeMap<String, V>, timestamp: i64) {
        for name in git_data.keys() {
            let Ok(root) = self.root(name) else { continue };
            if let Some(repo) = self.open_repo(root).await {
                if let Err(e) = repo.delete_ref(timestamp).await {
                    log::warn!("{}", e);
                }
            }
        }
    }

    async fn open_repo(&self, root: &WorkspaceRoot) -> Option<GitRepo> {
        let repo = GitRepo::open(&root.name, &root.absolute_path).await?;
        Some(repo.excluding(&self.state_dir).await)
    }

    async fn persist(&self) -> Result<(), EngineError> {
        let log_path = self.state_dir.join(LOG_FILE);
        let json =
            serde_json::to_string_pretty(&self.checkpoints).map_err(|e| EngineError::invalid_data(&log_path, e))?;
        let tmp_path = self.state_dir.join(format!("{}.tmp", LOG_FILE));
        fs::write(&tmp_path, json)
            .await
            .map_err(|e| EngineError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &log_path)
            .await
            .map_err(|e| EngineError::io(&log_path, e))
    }
}

/// Creates the state directory with a `.gitignore` that hides it from git.
async fn prepare_state_dir(state_dir: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(state_dir)
        .await
        .map_err(|e| EngineError::io(state_dir, e))?;
    let ignore = state_dir.join(".gitignore");
    if fs::metadata(&ignore).await.is_err() {
        fs::write(&ignore, "*\n").await.map_err(|e| EngineError::io(&ignore, e))?;
    }
    Ok(())
}

fn counter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\((\d+)\)\s*(.*)$").expect("counter regex"))
}

/// Splits a `(N) base` description into its counter and base text.
fn split_counter(description: &str) -> (u32, &str) {
    match counter_re().captures(description) {
        Some(caps) => {
            let count = caps[1].parse().unwrap_or(0);
            let base = caps.get(2).map_or("", |m| m.as_str());
            (count, base)
        }
        None => (0, description),
    }
}

/// Collapses a repeat of the previous checkpoint into a growing `(N)`
/// counter instead of an identical-looking entry.
fn counted_description(previous: Option<&Checkpoint>, title: &str, description: Option<String>) -> Option<String> {
    let Some(previous) = previous.filter(|p| p.title == title) else {
        return description;
    };
    let new_base = description.as_deref().unwrap_or("").trim();
    let (count, previous_base) = split_counter(previous.description.as_deref().unwrap_or("").trim());
    if new_base != previous_base.trim() {
        return description;
    }
    let count = count + 1;
    Some(if new_base.is_empty() {
        format!("({})", count)
    } else {
        format!("({}) {}", count, new_base)
    })
}
