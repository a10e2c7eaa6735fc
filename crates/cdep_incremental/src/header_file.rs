//! The header dependencies file.
//!
//! One JSON object per line, sorted by include literal and then by header
//! path:
//!
//! ```text
//! {"include":"a.h","header":"/work/inc/a.h","hash":"9f1c..."}
//! ```
//!
//! Build tools read it to learn which headers (and which versions of them)
//! a task's outputs were derived from.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use cdep_cache::CompilationState;
use cdep_common::{ContentHash, FileHasher};
use serde::{Deserialize, Serialize};

use crate::error::IncrementalError;

/// One line of the header dependencies file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderDependency {
    /// The include literal that reached the header, or the path relative to
    /// its include root when every root file is listed.
    pub include: String,
    /// Absolute path of the header.
    pub header: PathBuf,
    /// Hex content hash of the header.
    pub hash: String,
}

/// Writes `headers` to `path`, hashing each header with `hasher`.
///
/// Parent directories are created as needed. An existing file is replaced
/// atomically; on failure it is left as it was.
pub fn write_header_dependencies_file(
    path: &Path,
    headers: &BTreeMap<String, BTreeSet<PathBuf>>,
    hasher: &dyn FileHasher,
) -> Result<(), IncrementalError> {
    let to_error = |source: io::Error| IncrementalError::HeaderFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(to_error)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".tmp.{}", std::process::id()));
    let tmp = PathBuf::from(tmp);

    let written = write_records(&tmp, headers, hasher).and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(to_error(e));
    }
    Ok(())
}

fn write_records(
    path: &Path,
    headers: &BTreeMap<String, BTreeSet<PathBuf>>,
    hasher: &dyn FileHasher,
) -> io::Result<()> {
    let mut out = BufWriter::new(fs::File::create(path)?);
    for (include, files) in headers {
        for header in files {
            let record = HeaderDependency {
                include: include.clone(),
                header: header.clone(),
                hash: hasher.hash(header)?.to_string(),
            };
            writeln!(out, "{}", serde_json::to_string(&record)?)?;
        }
    }
    out.flush()
}

/// Reads a file written by [`write_header_dependencies_file`].
pub fn read_header_dependencies_file(path: &Path) -> io::Result<Vec<HeaderDependency>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(io::Error::from))
        .collect()
}

/// A [`FileHasher`] that answers from a [`CompilationState`] instead of
/// reading the disk again.
///
/// Files the state does not know about are hashed with `fallback`.
pub struct StateBackedHasher<'a> {
    state: &'a CompilationState,
    fallback: &'a dyn FileHasher,
}

impl<'a> StateBackedHasher<'a> {
    /// Creates a hasher over `state`.
    pub fn new(state: &'a CompilationState, fallback: &'a dyn FileHasher) -> Self {
        Self { state, fallback }
    }
}

impl FileHasher for StateBackedHasher<'_> {
    fn hash(&self, path: &Path) -> io::Result<ContentHash> {
        match self.state.get_state(path) {
            Some(snapshot) => Ok(snapshot.hash),
            None => self.fallback.hash(path),
        }
    }
}
