//! Configuration types deserialized from `cdep.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Default cache directory, relative to the project directory.
pub const DEFAULT_CACHE_DIR: &str = ".cdep";

/// The top-level project configuration parsed from `cdep.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Where persisted state is kept.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Named header-detection tasks.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,
}

/// Core project metadata.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name. Task paths are formed as `:<project>:<task>`.
    pub name: String,
}

/// Cache location settings.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Cache directory, relative to the project directory unless absolute.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

/// One set of sources compiled with the same search path and macros.
#[derive(Debug, Default, Deserialize)]
pub struct TaskConfig {
    /// Source files, or directories scanned recursively for C-family sources.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Header search roots, in precedence order.
    #[serde(default)]
    pub include_paths: Vec<String>,
    /// Whether `#import` directives are treated like `#include`.
    #[serde(default)]
    pub imports_are_includes: bool,
    /// Where to write the header dependencies file, if anywhere.
    #[serde(default)]
    pub header_dependencies_file: Option<String>,
    /// Macros defined on the compiler command line.
    #[serde(default)]
    pub macros: BTreeMap<String, String>,
}
