//! Per-file snapshots and the compilation state they make up.
//!
//! A [`CompilationState`] is always built afresh by the change-detection pass
//! and never mutated after it is published; it covers the current source files
//! plus every header transitively reachable from them, and nothing else.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use cdep_common::{ContentHash, Include, IncludeDirectives};
use serde::{Deserialize, Serialize};

/// Outcome of looking up one include candidate in the search path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolution {
    /// The candidate was found.
    Resolved {
        /// Absolute path of the header.
        file: PathBuf,
        /// The directory that matched: the including file's directory or one
        /// of the configured search roots.
        root: PathBuf,
    },
    /// No directory in the search order contains the candidate, or a macro
    /// expression could not be expanded to a literal path.
    Unresolved,
}

/// An include directive paired with where it resolved.
///
/// Macro includes may expand to several candidates, producing one
/// `ResolvedInclude` per candidate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResolvedInclude {
    /// The directive as written.
    pub include: Include,
    /// The literal the directive expanded to. Equal to `include.value` for
    /// quoted and system includes; empty when a macro had no usable value.
    pub candidate: String,
    /// Where the candidate was found.
    pub resolution: Resolution,
}

impl ResolvedInclude {
    /// Returns the resolved header path, if any.
    pub fn file(&self) -> Option<&Path> {
        match &self.resolution {
            Resolution::Resolved { file, .. } => Some(file),
            Resolution::Unresolved => None,
        }
    }

    /// Returns `true` if the candidate was found.
    pub fn is_resolved(&self) -> bool {
        matches!(self.resolution, Resolution::Resolved { .. })
    }
}

/// Snapshot of one source or header file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileState {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Content hash at the time of the snapshot.
    pub hash: ContentHash,
    /// Directives parsed from the file, in source order.
    pub directives: IncludeDirectives,
    /// Resolution results for every directive, in directive order.
    pub resolved: Vec<ResolvedInclude>,
}

impl SourceFileState {
    /// Iterates over the headers this file resolved to.
    pub fn resolved_files(&self) -> impl Iterator<Item = &Path> {
        self.resolved.iter().filter_map(ResolvedInclude::file)
    }

    /// Returns `true` if any directive could not be resolved.
    pub fn has_unresolved(&self) -> bool {
        self.resolved.iter().any(|r| !r.is_resolved())
    }
}

/// Everything the next build needs to decide what to recompile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationState {
    /// The top-level source files of the build that produced this state.
    sources: BTreeSet<PathBuf>,
    /// Snapshots for sources and all reachable headers, keyed by absolute path.
    files: BTreeMap<PathBuf, SourceFileState>,
    /// Fingerprint of the settings that shaped resolution (search roots,
    /// configured macros, import handling). `None` for an empty state.
    settings: Option<ContentHash>,
}

impl CompilationState {
    /// Creates an empty state, as seen on a first build.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a state from its parts.
    pub fn new(
        settings: ContentHash,
        sources: BTreeSet<PathBuf>,
        files: BTreeMap<PathBuf, SourceFileState>,
    ) -> Self {
        Self {
            sources,
            files,
            settings: Some(settings),
        }
    }

    /// Returns the snapshot for `path`, if recorded.
    pub fn get_state(&self, path: &Path) -> Option<&SourceFileState> {
        self.files.get(path)
    }

    /// Returns the top-level sources.
    pub fn sources(&self) -> &BTreeSet<PathBuf> {
        &self.sources
    }

    /// Returns `true` if `path` was a top-level source.
    pub fn is_source(&self, path: &Path) -> bool {
        self.sources.contains(path)
    }

    /// Iterates over all snapshots in path order.
    pub fn files(&self) -> impl Iterator<Item = &SourceFileState> {
        self.files.values()
    }

    /// Iterates over snapshots of files that are not top-level sources.
    pub fn headers(&self) -> impl Iterator<Item = &SourceFileState> {
        self.files.values().filter(|s| !self.sources.contains(&s.path))
    }

    /// Returns the settings fingerprint.
    pub fn settings(&self) -> Option<ContentHash> {
        self.settings
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.sources.is_empty()
    }
}
