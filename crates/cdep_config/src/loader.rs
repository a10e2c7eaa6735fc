//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::Path;

/// Name of the configuration file inside a project directory.
pub const CONFIG_FILE: &str = "cdep.toml";

/// Loads and validates a `cdep.toml` configuration from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `cdep.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.tasks.is_empty() {
        return Err(ConfigError::ValidationError(
            "at least one [tasks.<name>] table is required".to_string(),
        ));
    }
    for (name, task) in &config.tasks {
        if task.sources.is_empty() {
            return Err(ConfigError::MissingField(format!("tasks.{name}.sources")));
        }
        if let Some(bad) = task.macros.keys().find(|m| !is_identifier(m)) {
            return Err(ConfigError::ValidationError(format!(
                "tasks.{name}.macros: '{bad}' is not a valid macro name"
            )));
        }
    }
    Ok(())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
