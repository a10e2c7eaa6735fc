//! Error types for change detection.

use std::path::PathBuf;

use cdep_cache::CacheError;

/// Errors that abort change detection for a task.
///
/// Parse and resolution problems never show up here; they only reduce
/// precision. What does show up are failures on declared inputs and on the
/// outputs the task is responsible for.
#[derive(Debug, thiserror::Error)]
pub enum IncrementalError {
    /// A declared source file could not be read or hashed.
    #[error("task {task}: cannot read source file {}: {source}", .path.display())]
    SourceUnreadable {
        /// The task that declared the source.
        task: String,
        /// The offending source file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The final compilation state could not be persisted.
    #[error("task {task}: failed to store compilation state: {source}")]
    StateStore {
        /// The task whose state was being stored.
        task: String,
        /// The underlying store error.
        source: CacheError,
    },

    /// The header dependencies file could not be written.
    #[error("failed to write header dependencies file {}: {source}", .path.display())]
    HeaderFile {
        /// The file being written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An include root could not be listed while collecting every header.
    #[error("failed to scan include root {}: {source}", .path.display())]
    IncludeRootScan {
        /// The directory being listed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
