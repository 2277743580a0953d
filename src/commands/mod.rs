use crate::cli::args::CheckpointCommand;
use crate::cli::display::CliDisplayManager;
use patchwork::checkpoint::{CheckpointManager, CheckpointRequest};
use patchwork::errors::AppError;
use patchwork::file_processing::{build_previews, ApplyCoordinator, ConfiguredReconciler, PreviewSet};
use patchwork::models::{ResponseHistoryItem, SessionSnapshot, WorkspaceRoot};
use patchwork::response::{ingest, ParsedResponse};
use patchwork::review::{ReviewSession, ReviewState};
use patchwork::utils::config::{read_config, write_config, Config};
use patchwork::workspace::{expand_context_paths, parse_root_arg, resolve_context_paths};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

const APPLY_TITLE: &str = "Applied changes";

/// Builds the workspace from `--root` arguments, defaulting to the current
/// directory.
pub fn workspace_roots(args: &[String]) -> Result<Vec<WorkspaceRoot>, AppError> {
    let args: Vec<String> = if args.is_empty() {
        vec![".".to_string()]
    } else {
        args.to_vec()
    };
    let mut names = HashSet::new();
    let mut roots = Vec::new();
    for arg in &args {
        let root = parse_root_arg(arg).map_err(AppError::InvalidInput)?;
        if !names.insert(root.name.clone()) {
            return Err(AppError::InvalidInput(format!(
                "Workspace root name `{}` is used twice, name roots with `name=path`",
                root.name
            )));
        }
        roots.push(root);
    }
    Ok(roots)
}

async fn read_response(file: Option<&Path>) -> Result<String, AppError> {
    let raw = match file {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            raw
        }
    };
    if raw.trim().is_empty() {
        return Err(AppError::MissingResponse);
    }
    Ok(raw)
}

fn reconciler(config: &Config) -> ConfiguredReconciler {
    ConfiguredReconciler::from_command(
        config.reconciler_command.as_deref(),
        Duration::from_secs(config.reconciler_timeout_secs),
    )
}

async fn prepare(
    display: &mut CliDisplayManager,
    raw: &str,
    roots: &[WorkspaceRoot],
    origin_root: Option<&WorkspaceRoot>,
    config: &Config,
) -> PreviewSet {
    let parsed: ParsedResponse = ingest(raw);
    display.print_response_text(&parsed.text);
    if let Some(relevant) = &parsed.relevant_files {
        display.print_relevant_files(relevant);
    }

    display.start_spinner("Preparing edits");
    let set = build_previews(&parsed.edits, roots, origin_root, &reconciler(config)).await;
    display.stop_spinner();
    set
}

/// Handles the preview subcommand
pub async fn handle_preview(
    file: Option<PathBuf>,
    roots: &[WorkspaceRoot],
    config: &Config,
) -> Result<(), AppError> {
    let mut display = CliDisplayManager::new();
    let raw = read_response(file.as_deref()).await?;
    display.print_header();

    let set = prepare(&mut display, &raw, roots, None, config).await;
    if set.previews.is_empty() {
        display.print_info("No file edits found");
    } else {
        display.print_previews(&set.previews);
    }
    display.print_failures(&set.failures);
    Ok(())
}

pub struct ApplyOptions {
    pub file: Option<PathBuf>,
    pub reject: Vec<usize>,
    pub yes: bool,
    pub origin: Option<String>,
    pub instructions: Option<String>,
}

/// Handles the apply subcommand: preview, review, checkpoint, write.
pub async fn handle_apply(
    options: ApplyOptions,
    roots: &[WorkspaceRoot],
    config: &Config,
) -> Result<(), AppError> {
    let start_time = Instant::now();
    let mut display = CliDisplayManager::new();
    let origin_root = match &options.origin {
        Some(name) => Some(
            roots
                .iter()
                .find(|r| &r.name == name)
                .ok_or_else(|| AppError::InvalidInput(format!("No workspace root named `{}`", name)))?,
        ),
        None => None,
    };
    let from_stdin = options.file.is_none();
    let raw = read_response(options.file.as_deref()).await?;
    display.print_header();

    let set = prepare(&mut display, &raw, roots, origin_root, config).await;
    display.print_failures(&set.failures);
    if set.previews.is_empty() {
        display.print_info("Nothing to apply");
        return Ok(());
    }
    display.print_previews(&set.previews);

    let mut session = ReviewSession::new(set.previews);
    for number in &options.reject {
        let index = number
            .checked_sub(1)
            .ok_or_else(|| AppError::InvalidInput("File numbers start at 1".to_string()))?;
        session.reject(index)?;
    }
    for index in 0..session.len() {
        if session.state(index)? == ReviewState::Pending {
            session.accept(index)?;
        }
    }
    let checked = session.checked().count();
    if checked == 0 {
        display.print_info("Every file was rejected, nothing to apply");
        return Ok(());
    }

    if !options.yes {
        if from_stdin {
            return Err(AppError::InvalidInput(
                "The response was read from stdin, pass --yes to apply without a prompt".to_string(),
            ));
        }
        if !confirm(&format!("Apply {} file(s)? [y/N] ", checked)).await? {
            display.print_info("Cancelled");
            return Ok(());
        }
    }

    let mut manager = CheckpointManager::load(roots.to_vec(), config.state_dir(roots)).await?;
    let session_snapshot = SessionSnapshot {
        instructions: options.instructions.clone().unwrap_or_default(),
        response_history: vec![ResponseHistoryItem {
            response: raw.clone(),
            created_at: session.created_at(),
            raw_instructions: options.instructions.clone(),
        }],
        checked_files: session
            .checked()
            .map(|(_, preview)| preview.edit.file_path.clone())
            .collect(),
        ..SessionSnapshot::default()
    };
    display.start_spinner("Taking checkpoint");
    let checkpoint = manager
        .create_with(CheckpointRequest {
            title: APPLY_TITLE.to_string(),
            description: None,
            is_temporary: false,
            session: session_snapshot,
        })
        .await;
    display.stop_spinner();
    let checkpoint = checkpoint?;

    let coordinator = ApplyCoordinator::new();
    let pending: Vec<_> = session
        .checked()
        .map(|(index, preview)| (index, preview.diff_fallback_method, coordinator.begin(preview)))
        .collect();

    let mut written = 0;
    let mut failed = 0;
    for (index, fallback, write) in pending {
        let path = write.path().to_path_buf();
        match write.finish().await {
            Ok(()) => {
                written += 1;
                if let Some(method) = fallback {
                    session.mark_fallback(index, method)?;
                }
            }
            Err(e) => {
                failed += 1;
                log::error!("{}", e);
                display.print_error(&format!("{}: {}", path.display(), e));
            }
        }
    }

    let items = session.close();
    display.print_review(&items);
    display.print_info(&format!(
        "Undo with `patchwork checkpoint restore {}`",
        checkpoint.timestamp
    ));

    match manager.prune(config.checkpoint_lifespan_hours).await {
        Ok(removed) if !removed.is_empty() => {
            log::info!("Pruned {} expired checkpoint(s)", removed.len())
        }
        Ok(_) => {}
        Err(e) => log::warn!("Pruning failed: {}", e),
    }

    display.print_footer(written, failed, start_time.elapsed());
    Ok(())
}

async fn confirm(prompt: &str) -> Result<bool, AppError> {
    print!("{}", prompt);
    std::io::Write::flush(&mut std::io::stdout())?;
    let mut answer = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut answer).await?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Handles the checkpoint subcommand
pub async fn handle_checkpoint(
    action: CheckpointCommand,
    roots: &[WorkspaceRoot],
    config: &Config,
) -> Result<(), AppError> {
    let display = CliDisplayManager::new();
    let mut manager = CheckpointManager::load(roots.to_vec(), config.state_dir(roots)).await?;

    match action {
        CheckpointCommand::List => display.print_checkpoints(manager.list()),
        CheckpointCommand::Create { title, description } => {
            let checkpoint = manager.create(&title, description.as_deref()).await?;
            println!("Created checkpoint {}", checkpoint.timestamp);
        }
        CheckpointCommand::Restore { timestamp } => {
            let checkpoint = manager.restore(timestamp).await?;
            println!("Restored checkpoint {} ({})", timestamp, checkpoint.title);
            for item in &checkpoint.session.response_history {
                log::debug!("Checkpoint response from {}: {} bytes", item.created_at, item.response.len());
            }
        }
        CheckpointCommand::Prune { lifespan_hours } => {
            let hours = lifespan_hours.unwrap_or(config.checkpoint_lifespan_hours);
            let removed = manager.prune(hours).await?;
            println!("Pruned {} checkpoint(s)", removed.len());
        }
        CheckpointCommand::Star { timestamp } => {
            manager.set_starred(timestamp, true).await?;
            println!("Starred checkpoint {}", timestamp);
        }
        CheckpointCommand::Unstar { timestamp } => {
            manager.set_starred(timestamp, false).await?;
            println!("Unstarred checkpoint {}", timestamp);
        }
        CheckpointCommand::Delete { timestamp } => {
            manager.delete(timestamp).await?;
            println!("Deleted checkpoint {}", timestamp);
        }
        CheckpointCommand::Rename {
            timestamp,
            title,
            description,
        } => {
            manager.retitle(timestamp, &title, description.as_deref()).await?;
            println!("Renamed checkpoint {}", timestamp);
        }
    }
    Ok(())
}

/// Handles the context subcommand
pub async fn handle_context(paths: Vec<String>, roots: &[WorkspaceRoot]) -> Result<(), AppError> {
    let display = CliDisplayManager::new();
    let resolved = resolve_context_paths(&paths, roots, None);
    let files = expand_context_paths(&resolved, roots);
    display.print_context_files(&files);
    Ok(())
}

pub struct ConfigChanges {
    pub log_level: Option<String>,
    pub state_directory: Option<String>,
    pub checkpoint_lifespan_hours: Option<u64>,
    pub reconciler_command: Option<String>,
    pub reconciler_timeout_secs: Option<u64>,
}

/// Handles the config subcommand
pub async fn handle_config(changes: ConfigChanges) -> Result<(), AppError> {
    let mut config = read_config()?;

    if let Some(log_level) = changes.log_level {
        config.log_level = log_level.clone();
        println!("Log level set to {}", log_level);
    }

    if let Some(state_directory) = changes.state_directory {
        config.state_directory = state_directory.clone();
        println!("State directory set to {}", state_directory);
    }

    if let Some(hours) = changes.checkpoint_lifespan_hours {
        config.checkpoint_lifespan_hours = hours;
        println!("Checkpoint lifespan set to {} hour(s)", hours);
    }

    if let Some(command) = changes.reconciler_command {
        if command.trim().is_empty() {
            config.reconciler_command = None;
            println!("Reconciler command cleared");
        } else {
            println!("Reconciler command set to {}", command);
            config.reconciler_command = Some(command);
        }
    }

    if let Some(secs) = changes.reconciler_timeout_secs {
        config.reconciler_timeout_secs = secs;
        println!("Reconciler timeout set to {}s", secs);
    }

    write_config(&config)?;
    Ok(())
}
