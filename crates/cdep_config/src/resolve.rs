//! Task resolution: turning a task table into absolute sources and roots.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File extensions recognised as C, C++ or Objective-C sources.
const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++", "m", "mm"];

/// A task with every path made absolute and source directories expanded.
#[derive(Debug, Clone)]
pub struct ResolvedTask {
    /// The task name as written in `cdep.toml`.
    pub name: String,
    /// `:<project>:<task>`, used as the state key.
    pub path: String,
    /// Source files, sorted and deduplicated.
    pub sources: Vec<PathBuf>,
    /// Header search roots, in declared order.
    pub include_roots: Vec<PathBuf>,
    /// Whether `#import` directives count as includes.
    pub imports_are_includes: bool,
    /// Absolute path of the header dependencies file, if configured.
    pub header_dependencies_file: Option<PathBuf>,
    /// Compiler command-line macros.
    pub macros: BTreeMap<String, String>,
}

/// Resolves the task `task_name` relative to `project_dir`.
///
/// Directory entries in `sources` are walked recursively for files with a
/// C-family extension. A source entry that does not exist is an error, since a
/// declared source can never be silently skipped.
pub fn resolve_task(
    config: &ProjectConfig,
    project_dir: &Path,
    task_name: &str,
) -> Result<ResolvedTask, ConfigError> {
    let task = config
        .tasks
        .get(task_name)
        .ok_or_else(|| ConfigError::UnknownTask(task_name.to_string()))?;

    let mut sources = Vec::new();
    for entry in &task.sources {
        let path = absolutize(project_dir, entry);
        if path.is_dir() {
            walk_sources(&path, &mut sources)?;
        } else if path.is_file() {
            sources.push(path);
        } else {
            return Err(ConfigError::MissingSource(path));
        }
    }
    sources.sort();
    sources.dedup();

    Ok(ResolvedTask {
        name: task_name.to_string(),
        path: format!(":{}:{}", config.project.name, task_name),
        sources,
        include_roots: task
            .include_paths
            .iter()
            .map(|p| absolutize(project_dir, p))
            .collect(),
        imports_are_includes: task.imports_are_includes,
        header_dependencies_file: task
            .header_dependencies_file
            .as_deref()
            .map(|p| absolutize(project_dir, p)),
        macros: task.macros.clone(),
    })
}

/// Returns the cache directory for `config`, relative to `project_dir`.
pub fn cache_dir(config: &ProjectConfig, project_dir: &Path) -> PathBuf {
    absolutize(project_dir, &config.cache.dir)
}

/// Returns `true` if `path` has a C-family source extension.
pub fn is_c_family_source(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn absolutize(project_dir: &Path, entry: &str) -> PathBuf {
    let p = Path::new(entry);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        project_dir.join(p)
    }
}

fn walk_sources(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ConfigError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_sources(&path, files)?;
        } else if is_c_family_source(&path) {
            files.push(path);
        }
    }
    Ok(())
}
