//! Git plumbing for checkpoint snapshots.
//!
//! A snapshot is a commit of the whole working tree (tracked and untracked,
//! ignore rules honoured) built through a throwaway index, so the user's
//! real index and branch are never touched. The commit is kept alive by a
//! ref under `refs/patchwork/checkpoints/`.

use crate::errors::EngineError;
use crate::models::GitSnapshot;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const CHECKPOINT_REF_PREFIX: &str = "refs/patchwork/checkpoints";

const SNAPSHOT_IDENTITY: [(&str, &str); 4] = [
    ("GIT_AUTHOR_NAME", "patchwork"),
    ("GIT_AUTHOR_EMAIL", "patchwork@localhost"),
    ("GIT_COMMITTER_NAME", "patchwork"),
    ("GIT_COMMITTER_EMAIL", "patchwork@localhost"),
];

pub fn checkpoint_ref(timestamp: i64) -> String {
    format!("{}/{}", CHECKPOINT_REF_PREFIX, timestamp)
}

/// A workspace root that is (inside) a git repository.
#[derive(Debug, Clone)]
pub struct GitRepo {
    name: String,
    toplevel: PathBuf,
    git_dir: PathBuf,
    /// Work-tree relative directory left out of snapshots and restores.
    excluded: Option<String>,
}

impl GitRepo {
    /// Returns `None` when `path` is not in a git work tree or git is missing.
    pub async fn open(name: &str, path: &Path) -> Option<GitRepo> {
        let output = Command::new("git")
            .current_dir(path)
            .args(["rev-parse", "--show-toplevel", "--absolute-git-dir"])
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();
        let toplevel = PathBuf::from(lines.next()?.trim());
        let git_dir = PathBuf::from(lines.next()?.trim());
        Some(GitRepo {
            name: name.to_string(),
            toplevel,
            git_dir,
            excluded: None,
        })
    }

    pub fn toplevel(&self) -> &Path {
        &self.toplevel
    }

    /// Keeps `dir` out of snapshots and out of restore's cleanup when it lies
    /// inside the work tree. Used for the checkpoint state directory, which
    /// must survive a restore.
    pub async fn excluding(mut self, dir: &Path) -> Self {
        let canonical = tokio::fs::canonicalize(dir).await.ok();
        let relative = dir
            .strip_prefix(&self.toplevel)
            .ok()
            .or_else(|| canonical.as_deref().and_then(|c| c.strip_prefix(&self.toplevel).ok()))
            .map(|r| r.to_string_lossy().replace('\\', "/"))
            .filter(|r| !r.is_empty());
        if let Some(relative) = &relative {
            log::debug!("Excluding `{}` from snapshots of `{}`", relative, self.name);
        }
        self.excluded = relative;
        self
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded.as_deref().is_some_and(|dir| {
            path == dir || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Records the current branch and a commit of the working tree.
    pub async fn snapshot(&self, timestamp: i64) -> Result<GitSnapshot, EngineError> {
        let branch = self.current_branch().await;
        let parent = self.try_git(&["rev-parse", "-q", "--verify", "HEAD^{commit}"]).await;

        let index = self.scratch_index(timestamp);
        let result = self.commit_worktree(&index, parent.as_deref(), timestamp).await;
        remove_scratch(&index).await;
        let commit_hash = result?;

        self.git(&["update-ref", &checkpoint_ref(timestamp), &commit_hash], None)
            .await?;
        log::debug!(
            "Snapshot of `{}` at {} is {} on {}",
            self.name,
            timestamp,
            commit_hash,
            branch
        );
        Ok(GitSnapshot { branch, commit_hash })
    }

    async fn commit_worktree(
        &self,
        index: &Path,
        parent: Option<&str>,
        timestamp: i64,
    ) -> Result<String, EngineError> {
        if let Some(parent) = parent {
            self.git(&["read-tree", parent], Some(index)).await?;
        }
        let exclude = self.excluded.as_ref().map(|dir| format!(":(exclude){}", dir));
        let mut add = vec!["add", "-A", "--", "."];
        if let Some(exclude) = &exclude {
            add.push(exclude.as_str());
        }
        self.git(&add, Some(index)).await?;
        let tree = self.git(&["write-tree"], Some(index)).await?;

        let message = format!("patchwork checkpoint {}", timestamp);
        let mut args = vec!["commit-tree", tree.as_str(), "-m", message.as_str()];
        if let Some(parent) = parent {
            args.extend(["-p", parent]);
        }
        self.git(&args, Some(index)).await
    }

    /// Puts the recorded branch back and makes the working tree match the
    /// snapshot: snapshot files are rewritten, files absent from it removed.
    pub async fn restore(&self, snapshot: &GitSnapshot) -> Result<(), EngineError> {
        if snapshot.branch != "HEAD" && self.current_branch().await != snapshot.branch {
            self.git(&["checkout", &snapshot.branch], None).await?;
        }

        let index = self.scratch_index(chrono::Utc::now().timestamp_millis());
        let result = self.checkout_snapshot(&index, &snapshot.commit_hash).await;
        remove_scratch(&index).await;
        result?;

        let wanted: HashSet<String> = self
            .git(&["ls-tree", "-r", "-z", "--name-only", &snapshot.commit_hash], None)
            .await?
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        let present = self
            .git(&["ls-files", "-z", "--cached", "--others", "--exclude-standard"], None)
            .await?;
        for path in present.split('\0').filter(|p| !p.is_empty()) {
            if wanted.contains(path) || self.is_excluded(path) {
                continue;
            }
            let absolute = self.toplevel.join(path);
            match tokio::fs::remove_file(&absolute).await {
                Ok(()) => log::debug!("Removed `{}`", absolute.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(EngineError::io(absolute, e)),
            }
        }
        Ok(())
    }

    async fn checkout_snapshot(&self, index: &Path, commit: &str) -> Result<(), EngineError> {
        self.git(&["read-tree", commit], Some(index)).await?;
        if let Some(dir) = &self.excluded {
            self.git(
                &["rm", "-r", "-q", "--cached", "--ignore-unmatch", "--", dir.as_str()],
                Some(index),
            )
            .await?;
        }
        self.git(&["checkout-index", "-a", "-f"], Some(index)).await?;
        Ok(())
    }

    /// Drops the ref pinning a snapshot commit.
    pub async fn delete_ref(&self, timestamp: i64) -> Result<(), EngineError> {
        self.git(&["update-ref", "-d", &checkpoint_ref(timestamp)], None)
            .await
            .map(|_| ())
    }

    /// Branch name, or `HEAD` when detached.
    async fn current_branch(&self) -> String {
        self.try_git(&["symbolic-ref", "--short", "-q", "HEAD"])
            .await
            .unwrap_or_else(|| "HEAD".to_string())
    }

    fn scratch_index(&self, timestamp: i64) -> PathBuf {
        self.git_dir.join(format!("patchwork-index-{}", timestamp))
    }

    async fn try_git(&self, args: &[&str]) -> Option<String> {
        self.git(args, None).await.ok().filter(|out| !out.is_empty())
    }

    /// Runs git in the work tree, optionally against a scratch index, and
    /// returns trimmed stdout.
    async fn git(&self, args: &[&str], index: Option<&Path>) -> Result<String, EngineError> {
        let mut command = Command::new("git");
        command.current_dir(&self.toplevel).args(args);
        if let Some(index) = index {
            command.env("GIT_INDEX_FILE", OsString::from(index));
            command.envs(SNAPSHOT_IDENTITY);
        }

        let failed = |stderr: String| EngineError::GitOperationFailed {
            folder: self.name.clone(),
            command: args.join(" "),
            stderr,
        };
        let output = command.output().await.map_err(|e| failed(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(failed(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

async fn remove_scratch(index: &Path) {
    if let Err(e) = tokio::fs::remove_file(index).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Could not remove scratch index `{}`: {}", index.display(), e);
        }
    }
}
