mod cli;
mod commands;

use clap::Parser;
use cli::args::{Args, Commands};
use commands::{ApplyOptions, ConfigChanges};
use patchwork::errors::AppError;
use patchwork::utils::config::read_config;
use patchwork::utils::logger;

/// The main entry point of the application
#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();

    match args.command {
        Commands::Config {
            set_log_level,
            set_state_directory,
            set_checkpoint_lifespan_hours,
            set_reconciler_command,
            set_reconciler_timeout_secs,
        } => {
            commands::handle_config(ConfigChanges {
                log_level: set_log_level,
                state_directory: set_state_directory,
                checkpoint_lifespan_hours: set_checkpoint_lifespan_hours,
                reconciler_command: set_reconciler_command,
                reconciler_timeout_secs: set_reconciler_timeout_secs,
            })
            .await
        }
        command => run(command, &args.roots).await,
    }
}

async fn run(command: Commands, root_args: &[String]) -> Result<(), AppError> {
    let config = read_config()?;
    logger::setup_logger(&config);
    let roots = commands::workspace_roots(root_args)?;
    log::debug!("Workspace roots: {:?}", roots);

    match command {
        Commands::Preview { file } => commands::handle_preview(file, &roots, &config).await,
        Commands::Apply {
            file,
            reject,
            yes,
            origin,
            instructions,
        } => {
            let options = ApplyOptions {
                file,
                reject,
                yes,
                origin,
                instructions,
            };
            commands::handle_apply(options, &roots, &config).await
        }
        Commands::Checkpoint { action } => commands::handle_checkpoint(action, &roots, &config).await,
        Commands::Context { paths } => commands::handle_context(paths, &roots).await,
        Commands::Config { .. } => Ok(()),
    }
}
