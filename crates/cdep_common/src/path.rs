//! Interned file paths and lexical path normalization.

use std::path::{Component, Path, PathBuf};

use lasso::ThreadedRodeo;
use serde::{Deserialize, Serialize};

/// An interned absolute file path.
///
/// Paths are interned as `u32` indices so that build-scoped caches can key on
/// them with O(1) hashing and equality, and so that concurrent tasks looking up
/// the same header share a single string allocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct PathId(u32);

impl PathId {
    /// Returns the raw `u32` index of this path.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

// SAFETY: `PathId` wraps a `u32` which is always a valid `usize` on 32-bit and
// 64-bit platforms. `try_from_usize` rejects values that don't fit in `u32`.
unsafe impl lasso::Key for PathId {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(PathId)
    }
}

/// Thread-safe path interner backed by [`lasso::ThreadedRodeo`].
pub struct PathInterner {
    rodeo: ThreadedRodeo<PathId>,
}

impl PathInterner {
    /// Creates a new empty interner.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Interns a path, returning its [`PathId`].
    ///
    /// Non-UTF-8 components are interned in their lossy form, so two such
    /// paths may share an id. Callers keying caches on ids must not intern
    /// them.
    pub fn intern(&self, path: &Path) -> PathId {
        self.rodeo.get_or_intern(path.to_string_lossy())
    }

    /// Resolves a [`PathId`] back to its path.
    ///
    /// # Panics
    ///
    /// Panics if the `PathId` was not created by this interner.
    pub fn resolve(&self, id: PathId) -> &Path {
        Path::new(self.rodeo.resolve(&id))
    }

    /// Returns the number of distinct paths interned so far.
    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    /// Returns `true` if no path has been interned.
    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

impl std::fmt::Debug for PathInterner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathInterner").field("len", &self.len()).finish()
    }
}

impl Default for PathInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexically normalizes a path by removing `.` components and folding `..`
/// into the preceding component.
///
/// The filesystem is never consulted, so symlinks are not resolved. A `..`
/// that would climb above the root is dropped.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
