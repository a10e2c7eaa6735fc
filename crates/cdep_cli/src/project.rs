//! Shared project helpers for CLI commands.
//!
//! Locates the project root, loads `cdep.toml`, opens the state store and
//! resolves the tasks a command should act on.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cdep_cache::StateStore;
use cdep_config::{ProjectConfig, ResolvedTask, CONFIG_FILE};

use crate::GlobalArgs;

/// Version recorded in persisted state; state from another version is ignored.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Walks up from `start` looking for the nearest directory containing `cdep.toml`.
///
/// Returns the directory containing `cdep.toml`, or an error if none is found.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// A loaded project.
pub struct Project {
    /// Directory relative paths in the configuration are resolved against.
    pub dir: PathBuf,
    /// The parsed configuration.
    pub config: ProjectConfig,
    /// Persistent state for every task of the project.
    pub store: Arc<StateStore>,
}

impl Project {
    /// Loads the project selected by the global arguments.
    ///
    /// If `--config` names a file, that file is loaded and its directory is
    /// the project directory; if it names a directory, `cdep.toml` inside it
    /// is loaded. Otherwise the current directory and its parents are
    /// searched.
    pub fn open(global: &GlobalArgs) -> Result<Self, Box<dyn Error>> {
        let (dir, config) = match &global.config {
            Some(path) => {
                let path = PathBuf::from(path);
                if path.is_file() {
                    let content = std::fs::read_to_string(&path)?;
                    let dir = match path.parent() {
                        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                        _ => PathBuf::from("."),
                    };
                    (dir, cdep_config::load_config_from_str(&content)?)
                } else {
                    let config = cdep_config::load_config(&path)?;
                    (path, config)
                }
            }
            None => {
                let dir = find_project_root(&std::env::current_dir()?)?;
                let config = cdep_config::load_config(&dir)?;
                (dir, config)
            }
        };
        let dir = std::path::absolute(&dir)?;
        let store = Arc::new(StateStore::new(
            &cdep_config::cache_dir(&config, &dir),
            TOOL_VERSION,
        ));
        Ok(Self { dir, config, store })
    }

    /// Names of the tasks to act on: `requested` if given, else every task.
    pub fn task_names(&self, requested: &[String]) -> Vec<String> {
        if requested.is_empty() {
            self.config.tasks.keys().cloned().collect()
        } else {
            requested.to_vec()
        }
    }

    /// Resolves one task.
    pub fn resolve(&self, name: &str) -> Result<ResolvedTask, Box<dyn Error>> {
        Ok(cdep_config::resolve_task(&self.config, &self.dir, name)?)
    }

    /// State key of a task, without resolving its sources.
    pub fn task_path(&self, name: &str) -> String {
        format!(":{}:{}", self.config.project.name, name)
    }
}

/// Converts a resolved task into depend task inputs.
pub fn depend_spec(task: &ResolvedTask) -> cdep_incremental::DependSpec {
    cdep_incremental::DependSpec {
        task_path: task.path.clone(),
        sources: task.sources.clone(),
        include_roots: task.include_roots.clone(),
        imports_are_includes: task.imports_are_includes,
        macros: task.macros.clone(),
        header_dependencies_file: task.header_dependencies_file.clone(),
    }
}

/// Renders `path` relative to `base` when possible.
pub fn display_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base).unwrap_or(path).display().to_string()
}
