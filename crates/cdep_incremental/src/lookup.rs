//! Memoized file-existence checks.
//!
//! Include resolution probes the same candidate paths over and over: every
//! source that includes `<common.h>` walks the same search roots. A
//! [`PathLookup`] answers each probe once per build phase and serves repeats
//! from memory. It must be [`clear`](PathLookup::clear)ed whenever the files
//! on disk may have changed, e.g. at the start of a new task.

use std::path::Path;
use std::sync::Arc;

use cdep_common::{PathId, PathInterner};
use dashmap::DashMap;

use crate::guard::KeyGuard;

/// Concurrent cache of `path -> is a regular file`.
///
/// Concurrent lookups of the same path hit the filesystem at most once.
#[derive(Debug)]
pub struct PathLookup {
    interner: Arc<PathInterner>,
    found: DashMap<PathId, bool>,
    guard: KeyGuard,
}

impl PathLookup {
    /// Creates an empty lookup that interns paths into `interner`.
    pub fn new(interner: Arc<PathInterner>) -> Self {
        Self {
            interner,
            found: DashMap::new(),
            guard: KeyGuard::striped(),
        }
    }

    /// Returns `true` if `path` exists and is a regular file.
    ///
    /// Paths that are not valid UTF-8 are never memoized, since their lossy
    /// interned form may collide with a different path.
    pub fn is_file(&self, path: &Path) -> bool {
        if path.to_str().is_none() {
            return path.is_file();
        }
        let id = self.interner.intern(path);
        if let Some(found) = self.found.get(&id) {
            return *found;
        }
        self.guard.guard_by_key(&id, || {
            if let Some(found) = self.found.get(&id) {
                return *found;
            }
            let found = path.is_file();
            self.found.insert(id, found);
            found
        })
    }

    /// Forgets every answer.
    pub fn clear(&self) {
        self.found.clear();
    }

    /// Number of memoized answers.
    pub fn len(&self) -> usize {
        self.found.len()
    }

    /// Returns `true` if nothing is memoized.
    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }
}

impl Default for PathLookup {
    fn default() -> Self {
        Self::new(Arc::new(PathInterner::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn answers_are_memoized_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.h");
        let lookup = PathLookup::default();

        assert!(!lookup.is_file(&file));
        fs::write(&file, "").unwrap();
        // Still the memoized answer.
        assert!(!lookup.is_file(&file));

        lookup.clear();
        assert!(lookup.is_empty());
        assert!(lookup.is_file(&file));
        assert_eq!(lookup.len(), 1);
    }

    #[test]
    fn directories_are_not_files() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = PathLookup::default();
        assert!(!lookup.is_file(dir.path()));
    }

    #[test]
    fn concurrent_lookups_agree() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("shared.h");
        fs::write(&file, "").unwrap();
        let lookup = Arc::new(PathLookup::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lookup = Arc::clone(&lookup);
                let file = file.clone();
                std::thread::spawn(move || lookup.is_file(&file))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(lookup.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_siblings_get_their_own_answers() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(OsStr::from_bytes(b"\xff.h"));
        let present = dir.path().join(OsStr::from_bytes(b"\xfe.h"));
        if fs::write(&present, "").is_err() {
            // Filesystem rejects non-UTF-8 names.
            return;
        }
        let lookup = PathLookup::default();

        assert!(!lookup.is_file(&missing));
        assert!(lookup.is_file(&present));
        assert!(!lookup.is_file(&missing));
        assert!(lookup.is_empty());
    }
}
