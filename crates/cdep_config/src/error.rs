//! Error types for configuration loading and validation.

use std::path::PathBuf;

/// Errors that can occur when loading or validating a `cdep.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A referenced task name does not exist in the configuration.
    #[error("unknown task '{0}'")]
    UnknownTask(String),

    /// A required field is missing from the configuration.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A configured source path does not exist.
    #[error("source path does not exist: {}", .0.display())]
    MissingSource(PathBuf),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}
