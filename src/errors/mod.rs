pub mod engine;

pub use engine::EngineError;

use std::fmt;

#[derive(Debug)]
pub enum AppError {
    IoError(std::io::Error),
    EngineError(EngineError),
    TomlError(toml::de::Error),
    TomlWriteError(toml::ser::Error),
    JsonError(serde_json::Error),
    MissingResponse,
    InvalidInput(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::IoError(e) => write!(f, "IO error: {}", e),
            AppError::EngineError(e) => write!(f, "{}", e),
            AppError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            AppError::TomlWriteError(e) => write!(f, "TOML serialization error: {}", e),
            AppError::JsonError(e) => write!(f, "JSON error: {}", e),
            AppError::MissingResponse => write!(f, "Response text is empty"),
            AppError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::TomlError(err)
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        AppError::TomlWriteError(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::JsonError(err)
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::EngineError(err)
    }
}
