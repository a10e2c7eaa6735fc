//! Shared foundational types used across the cdep workspace.
//!
//! This crate provides content hashing, the include directive model produced by
//! the source parser, interned file paths, and the injectable metrics sink used
//! for coarse timing diagnostics.

#![warn(missing_docs)]

pub mod directive;
pub mod hash;
pub mod metrics;
pub mod path;

pub use directive::{Include, IncludeDirectives, IncludeKind, MacroDef, MacroTable};
pub use hash::{ContentHash, ContentHasher, FileHasher};
pub use metrics::{MetricsSink, NoopMetrics, Operation, OperationReport, OperationStats};
pub use path::{normalize_path, PathId, PathInterner};
