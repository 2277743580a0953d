//! File-level backups for workspace roots that are not git repositories.
//!
//! Layout under a checkpoint's backup directory:
//!
//! ```text
//! backups/<timestamp>/rollback.toml
//! backups/<timestamp>/<root name>/<relative path>
//! ```

use crate::errors::EngineError;
use crate::models::WorkspaceRoot;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// Files above this size are neither backed up nor removed on restore.
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

const SKIPPED_DIRS: [&str; 3] = [".git", "node_modules", "target"];

const MANIFEST_FILE: &str = "rollback.toml";

#[derive(Serialize, Deserialize, Debug, Default)]
struct RollbackManifest {
    roots: Vec<RootBackup>,
}

#[derive(Serialize, Deserialize, Debug)]
struct RootBackup {
    name: String,
    path: String,
    /// (path relative to the root, path of the copy relative to the backup dir)
    rollback_files: Vec<(String, String)>,
}

/// Copies every eligible file of `roots` into `backup_dir`.
pub async fn back_up(
    backup_dir: &Path,
    roots: &[&WorkspaceRoot],
    state_dir: &Path,
) -> Result<(), EngineError> {
    fs::create_dir_all(backup_dir)
        .await
        .map_err(|e| EngineError::io(backup_dir, e))?;

    let mut manifest = RollbackManifest::default();
    for root in roots {
        let mut rollback_files = Vec::new();
        for relative in eligible_files(&root.absolute_path, state_dir) {
            let source = root.absolute_path.join(&relative);
            let stored = Path::new(&root.name).join(&relative);
            let target = backup_dir.join(&stored);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| EngineError::io(parent, e))?;
            }
            fs::copy(&source, &target)
                .await
                .map_err(|e| EngineError::io(&source, e))?;
            rollback_files.push((to_slash(&relative), to_slash(&stored)));
        }
        log::debug!("Backed up {} file(s) of `{}`", rollback_files.len(), root.name);
        manifest.roots.push(RootBackup {
            name: root.name.clone(),
            path: root.absolute_path.to_string_lossy().into_owned(),
            rollback_files,
        });
    }

    let manifest_path = backup_dir.join(MANIFEST_FILE);
    let manifest_str =
        toml::to_string(&manifest).map_err(|e| EngineError::invalid_data(&manifest_path, e))?;
    fs::write(&manifest_path, manifest_str)
        .await
        .map_err(|e| EngineError::io(&manifest_path, e))
}

/// Puts backed-up files back and removes files created since the backup.
pub async fn restore(backup_dir: &Path, state_dir: &Path) -> Result<(), EngineError> {
    let manifest_path = backup_dir.join(MANIFEST_FILE);
    let manifest_str = fs::read_to_string(&manifest_path)
        .await
        .map_err(|e| EngineError::io(&manifest_path, e))?;
    let manifest: RollbackManifest =
        toml::from_str(&manifest_str).map_err(|e| EngineError::invalid_data(&manifest_path, e))?;

    for root in manifest.roots {
        let root_path = PathBuf::from(&root.path);
        let kept: HashSet<&str> = root.rollback_files.iter().map(|(rel, _)| rel.as_str()).collect();

        for relative in eligible_files(&root_path, state_dir) {
            if kept.contains(to_slash(&relative).as_str()) {
                continue;
            }
            let path = root_path.join(&relative);
            fs::remove_file(&path)
                .await
                .map_err(|e| EngineError::io(&path, e))?;
            log::debug!("Deleted new file: {}", path.display());
        }

        for (relative, stored) in &root.rollback_files {
            let original = root_path.join(relative);
            let backup = backup_dir.join(stored);
            if let Some(parent) = original.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| EngineError::io(parent, e))?;
            }
            fs::copy(&backup, &original)
                .await
                .map_err(|e| EngineError::io(&backup, e))?;
        }
        log::debug!("Restored {} file(s) of `{}`", root.rollback_files.len(), root.name);
    }
    Ok(())
}

pub async fn remove(backup_dir: &Path) -> Result<(), EngineError> {
    match fs::remove_dir_all(backup_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::io(backup_dir, e)),
    }
}

/// Files under `root` relative to it, skipping VCS and build directories,
/// the state directory and oversized files.
fn eligible_files(root: &Path, state_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let skipped_name = entry.depth() > 0
                && entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name));
            !skipped_name && !entry.path().starts_with(state_dir)
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.metadata().map(|m| m.len() <= MAX_FILE_SIZE).unwrap_or(false))
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect()
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
