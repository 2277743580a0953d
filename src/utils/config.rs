// src/utils/config.rs

use crate::errors::AppError;
use crate::models::WorkspaceRoot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

/// Environment variable pointing at an alternative config file.
pub const CONFIG_ENV: &str = "PATCHWORK_CONFIG";

const LOG_LEVELS: [&str; 5] = ["debug", "info", "warn", "error", "off"];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: String,
    /// Where checkpoints and backups live. Relative paths are taken from the
    /// first workspace root.
    pub state_directory: String,
    pub checkpoint_lifespan_hours: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciler_command: Option<String>,
    pub reconciler_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "off".to_string(),
            state_directory: ".patchwork".to_string(),
            checkpoint_lifespan_hours: 48,
            reconciler_command: None,
            reconciler_timeout_secs: 120,
        }
    }
}

impl Config {
    /// Absolute state directory for a workspace.
    pub fn state_dir(&self, roots: &[WorkspaceRoot]) -> PathBuf {
        let configured = Path::new(&self.state_directory);
        match roots.first() {
            Some(root) if configured.is_relative() => root.absolute_path.join(configured),
            _ => configured.to_path_buf(),
        }
    }
}

pub fn get_config_path() -> Result<PathBuf, AppError> {
    if let Some(path) = env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let mut path = get_executable_dir()?;
    path.push("config.toml");
    Ok(path)
}

/// Validate config to prevent obviously wrong or missing values.
pub fn validate_config(config: &Config) -> Result<(), AppError> {
    if !LOG_LEVELS.contains(&config.log_level.as_str()) {
        return Err(AppError::InvalidInput(format!(
            "Log level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.log_level
        )));
    }
    if config.state_directory.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "State directory cannot be empty".to_string(),
        ));
    }
    if config.checkpoint_lifespan_hours == 0 {
        return Err(AppError::InvalidInput(
            "Checkpoint lifespan must be at least one hour".to_string(),
        ));
    }
    if config.reconciler_timeout_secs == 0 {
        return Err(AppError::InvalidInput(
            "Reconciler timeout cannot be zero".to_string(),
        ));
    }
    Ok(())
}

/// Read config from file, and create a default config if none exists.
pub fn read_config() -> Result<Config, AppError> {
    read_config_from(&get_config_path()?)
}

pub fn read_config_from(config_path: &Path) -> Result<Config, AppError> {
    if !config_path.exists() {
        write_config_to(config_path, &Config::default())?;
    }
    let config_str = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&config_str)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn write_config(config: &Config) -> Result<(), AppError> {
    write_config_to(&get_config_path()?, config)
}

pub fn write_config_to(config_path: &Path, config: &Config) -> Result<(), AppError> {
    validate_config(config)?;
    let config_str = toml::to_string(config)?;
    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(config_path, config_str)?;
    Ok(())
}

fn get_executable_dir() -> Result<PathBuf, AppError> {
    let exe = env::current_exe()?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| AppError::InvalidInput("Executable has no parent directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = read_config_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_round_trip_with_reconciler() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            reconciler_command: Some("merge-tool --stdin".to_string()),
            log_level: "debug".to_string(),
            ..Config::default()
        };
        write_config_to(&path, &config).unwrap();
        assert_eq!(read_config_from(&path).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        let bad_level = Config {
            log_level: "loud".to_string(),
            ..Config::default()
        };
        assert!(validate_config(&bad_level).is_err());

        let zero_lifespan = Config {
            checkpoint_lifespan_hours: 0,
            ..Config::default()
        };
        assert!(validate_config(&zero_lifespan).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "log_level = \"off\"\n").unwrap();
        assert!(matches!(read_config_from(&path), Err(AppError::TomlError(_))));
    }

    #[test]
    fn test_state_dir_is_relative_to_first_root() {
        let config = Config::default();
        let roots = vec![WorkspaceRoot::new("a", "/work/a"), WorkspaceRoot::new("b", "/work/b")];
        assert_eq!(config.state_dir(&roots), PathBuf::from("/work/a/.patchwork"));

        let absolute = Config {
            state_directory: "/var/patchwork".to_string(),
            ..Config::default()
        };
        assert_eq!(absolute.state_dir(&roots), PathBuf::from("/var/patchwork"));
    }
}
