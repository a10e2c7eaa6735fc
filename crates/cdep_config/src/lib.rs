//! Parsing and validation of `cdep.toml` project configuration files.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`ProjectConfig`], and resolves individual tasks into absolute source files
//! and include search roots.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{cache_dir, is_c_family_source, resolve_task, ResolvedTask};
pub use types::*;
