//! Merging truncated edits back into the original file.
//!
//! Truncated edits elide unchanged regions with marker comments. Working out
//! what those regions were is delegated to an external tool.

use crate::errors::EngineError;
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[allow(async_fn_in_trait)]
pub trait Reconciler {
    /// Returns the full file content for `truncated` applied to `original`.
    async fn reconcile(&self, path: &str, original: &str, truncated: &str) -> Result<String, EngineError>;
}

/// Fails every request. Used when no reconciler is configured.
pub struct NoReconciler;

impl Reconciler for NoReconciler {
    async fn reconcile(&self, path: &str, _original: &str, _truncated: &str) -> Result<String, EngineError> {
        Err(EngineError::ReconcileFailed {
            path: path.to_string(),
            message: "no reconciler configured (set `reconciler_command`)".to_string(),
        })
    }
}

#[derive(Serialize)]
struct ReconcileRequest<'a> {
    path: &'a str,
    original: &'a str,
    truncated: &'a str,
}

/// Runs a shell command with a JSON request on stdin and takes its stdout
/// as the reconciled content.
pub struct CommandReconciler {
    command: String,
    timeout: Duration,
}

impl CommandReconciler {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        CommandReconciler {
            command: command.into(),
            timeout,
        }
    }

    fn shell(&self) -> Command {
        if cfg!(windows) {
            let mut command = Command::new("cmd");
            command.args(["/C", self.command.as_str()]);
            command
        } else {
            let mut command = Command::new("sh");
            command.args(["-c", self.command.as_str()]);
            command
        }
    }

    async fn run(&self, request: &ReconcileRequest<'_>) -> Result<String, String> {
        let payload = serde_json::to_vec(request).map_err(|e| e.to_string())?;
        let mut child = self
            .shell()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("could not start `{}`: {}", self.command, e))?;

        // Feed stdin while stdout is drained, or a filter blocks on a full
        // pipe. A command that never reads stdin may exit before the write
        // lands. Dropping stdin at the end sends EOF.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(&payload).await {
                    log::debug!("Reconciler stdin closed early: {}", e);
                }
            }
        };
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| e.to_string())?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            });
        }
        let content = String::from_utf8(output.stdout).map_err(|e| e.to_string())?;
        if content.trim().is_empty() {
            return Err("produced no output".to_string());
        }
        Ok(content)
    }
}

impl Reconciler for CommandReconciler {
    async fn reconcile(&self, path: &str, original: &str, truncated: &str) -> Result<String, EngineError> {
        let request = ReconcileRequest {
            path,
            original,
            truncated,
        };
        log::debug!("Reconciling `{}` with `{}`", path, self.command);
        let result = match tokio::time::timeout(self.timeout, self.run(&request)).await {
            Ok(result) => result,
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
        };
        result.map_err(|message| EngineError::ReconcileFailed {
            path: path.to_string(),
            message,
        })
    }
}

/// The reconciler selected by configuration.
pub enum ConfiguredReconciler {
    Command(CommandReconciler),
    Disabled(NoReconciler),
}

impl ConfiguredReconciler {
    pub fn from_command(command: Option<&str>, timeout: Duration) -> Self {
        match command.map(str::trim).filter(|c| !c.is_empty()) {
            Some(command) => ConfiguredReconciler::Command(CommandReconciler::new(command, timeout)),
            None => ConfiguredReconciler::Disabled(NoReconciler),
        }
    }
}

impl Reconciler for ConfiguredReconciler {
    async fn reconcile(&self, path: &str, original: &str, truncated: &str) -> Result<String, EngineError> {
        match self {
            ConfiguredReconciler::Command(inner) => inner.reconcile(path, original, truncated).await,
            ConfiguredReconciler::Disabled(inner) => inner.reconcile(path, original, truncated).await,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_reconciler_fails() {
        let err = NoReconciler.reconcile("a.rs", "a", "b").await.unwrap_err();
        assert!(matches!(err, EngineError::ReconcileFailed { ref path, .. } if path == "a.rs"));
    }

    #[tokio::test]
    async fn test_command_receives_json_request() {
        let reconciler = CommandReconciler::new("cat", Duration::from_secs(10));
        let output = reconciler.reconcile("a.rs", "old", "new // ...").await.unwrap();
        let echoed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(echoed["path"], "a.rs");
        assert_eq!(echoed["original"], "old");
        assert_eq!(echoed["truncated"], "new // ...");
    }

    #[tokio::test]
    async fn test_large_payload_does_not_stall() {
        let original = "x".repeat(300_000);
        let reconciler = CommandReconciler::new("cat", Duration::from_secs(10));
        let output = reconciler.reconcile("a.rs", &original, "// ...").await.unwrap();
        let echoed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(echoed["original"].as_str().map(str::len), Some(300_000));
    }

    #[tokio::test]
    async fn test_command_failure_surfaces_stderr() {
        let reconciler = CommandReconciler::new("echo broken >&2; exit 3", Duration::from_secs(10));
        let err = reconciler.reconcile("a.rs", "", "").await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let reconciler = CommandReconciler::new("sleep 5", Duration::from_millis(100));
        let err = reconciler.reconcile("a.rs", "", "").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_configured_without_command_is_disabled() {
        let reconciler = ConfiguredReconciler::from_command(Some("  "), Duration::from_secs(1));
        assert!(matches!(reconciler, ConfiguredReconciler::Disabled(_)));
    }
}
