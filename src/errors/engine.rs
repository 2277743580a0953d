// src/errors/engine.rs

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the ingestion engine. Each one is scoped to a single
/// edit (or a single git root) so siblings keep going.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("could not determine a file path for block at line {line}: {reason}")]
    ParseAmbiguous { line: usize, reason: String },

    #[error("could not resolve `{path}`{}", workspace_suffix(.workspace))]
    PathUnresolvable {
        path: String,
        workspace: Option<String>,
    },

    #[error("patch for `{path}` does not apply: {reason}")]
    PatchApplyFailed { path: String, reason: String },

    #[error("reconciler failed for `{path}`: {message}")]
    ReconcileFailed { path: String, message: String },

    #[error("`git {command}` failed in `{folder}`: {stderr}")]
    GitOperationFailed {
        folder: String,
        command: String,
        stderr: String,
    },

    #[error("item {index} cannot change state from {from}")]
    InvalidTransition { index: usize, from: String },

    #[error("review item {index} out of range (session has {len} items)")]
    ReviewIndexOutOfRange { index: usize, len: usize },

    #[error("no checkpoint with timestamp {0}")]
    CheckpointNotFound(i64),

    #[error("write to `{path}` was cancelled by a newer apply")]
    WriteCancelled { path: PathBuf },

    #[error("io error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn workspace_suffix(workspace: &Option<String>) -> String {
    match workspace {
        Some(name) => format!(" in workspace `{}`", name),
        None => String::new(),
    }
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    /// An unreadable or unwritable state file.
    pub fn invalid_data(
        path: impl Into<PathBuf>,
        error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        EngineError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, error))
    }
}
