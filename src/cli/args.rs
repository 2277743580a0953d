use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for patchwork.
#[derive(Parser, Debug, PartialEq, Clone)]
#[command(version, about = "Apply file edits from an assistant response, with checkpoints", long_about = None)]
pub struct Args {
    /// Workspace root as `[name=]path`. Repeat for multi-root workspaces.
    /// Defaults to the current directory.
    #[arg(short, long = "root", global = true)]
    pub roots: Vec<String>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for patchwork.
#[derive(Subcommand, Debug, PartialEq, Clone)]
pub enum Commands {
    /// Show the edits a response would make without writing anything.
    Preview {
        /// File holding the response. Reads stdin when omitted.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Apply the edits of a response, taking a checkpoint first.
    Apply {
        /// File holding the response. Reads stdin when omitted.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 1-based numbers (as shown by `preview`) of files to leave out.
        #[arg(long, value_delimiter = ',')]
        reject: Vec<usize>,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,

        /// Resolve every path against this workspace root.
        #[arg(long)]
        origin: Option<String>,

        /// Instructions that produced the response, stored with the checkpoint.
        #[arg(long)]
        instructions: Option<String>,
    },

    /// Manage checkpoints.
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointCommand,
    },

    /// List the files selected by a context path set (`!path` excludes).
    Context {
        #[arg(required = true, allow_hyphen_values = true)]
        paths: Vec<String>,
    },

    /// Manage configuration options.
    Config {
        /// Set the log level (debug, info, warn, error, off).
        #[arg(long)]
        set_log_level: Option<String>,

        /// Set the state directory.
        #[arg(long)]
        set_state_directory: Option<String>,

        /// Set how long checkpoints are kept, in hours.
        #[arg(long)]
        set_checkpoint_lifespan_hours: Option<u64>,

        /// Set the command used to merge truncated edits. Empty to unset.
        #[arg(long)]
        set_reconciler_command: Option<String>,

        /// Set the reconciler timeout in seconds.
        #[arg(long)]
        set_reconciler_timeout_secs: Option<u64>,
    },
}

#[derive(Subcommand, Debug, PartialEq, Clone)]
pub enum CheckpointCommand {
    /// List checkpoints, newest first.
    List,

    /// Take a checkpoint now.
    Create {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Restore the workspace to a checkpoint.
    Restore { timestamp: i64 },

    /// Remove expired checkpoints.
    Prune {
        /// Overrides the configured lifespan.
        #[arg(long)]
        lifespan_hours: Option<u64>,
    },

    /// Protect a checkpoint from pruning.
    Star { timestamp: i64 },

    Unstar { timestamp: i64 },

    Delete { timestamp: i64 },

    /// Change a checkpoint's title and description.
    Rename {
        timestamp: i64,
        title: String,
        #[arg(short, long)]
        description: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply() {
        let args = Args::parse_from([
            "patchwork", "apply", "--root", "api=/srv/api", "-r", "/srv/web", "--reject", "2,3", "-y",
        ]);
        assert_eq!(args.roots, vec!["api=/srv/api".to_string(), "/srv/web".to_string()]);
        match args.command {
            Commands::Apply { reject, yes, file, .. } => {
                assert_eq!(reject, vec![2, 3]);
                assert!(yes);
                assert!(file.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_checkpoint_rename() {
        let args = Args::parse_from(["patchwork", "checkpoint", "rename", "17", "New title", "-d", "why"]);
        assert_eq!(
            args.command,
            Commands::Checkpoint {
                action: CheckpointCommand::Rename {
                    timestamp: 17,
                    title: "New title".to_string(),
                    description: Some("why".to_string()),
                }
            }
        );
    }

    #[test]
    fn test_parse_context_exclusions() {
        let args = Args::parse_from(["patchwork", "context", "src", "!src/gen"]);
        assert_eq!(
            args.command,
            Commands::Context {
                paths: vec!["src".to_string(), "!src/gen".to_string()]
            }
        );
    }
}
