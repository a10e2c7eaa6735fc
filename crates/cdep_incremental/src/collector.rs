//! Header inputs for a compile task.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::compilation::IncrementalCompilation;
use crate::error::IncrementalError;

/// Flattens an [`IncrementalCompilation`] into the set of header files a
/// task depends on.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderDependenciesCollector;

impl HeaderDependenciesCollector {
    /// Creates a collector.
    pub fn new() -> Self {
        Self
    }

    /// Returns the header inputs of the task at `task_path`.
    ///
    /// Normally these are the headers the includes resolved to. When some
    /// macro include could not be resolved the true set is unknown, so every
    /// file under every include root is returned instead.
    pub fn collect_header_dependencies(
        &self,
        task_path: &str,
        include_roots: &[PathBuf],
        compilation: &IncrementalCompilation,
    ) -> Result<BTreeSet<PathBuf>, IncrementalError> {
        let headers = self.collect_header_map(task_path, include_roots, compilation)?;
        Ok(headers.into_values().flatten().collect())
    }

    /// Like [`collect_header_dependencies`](Self::collect_header_dependencies),
    /// but keeps the headers grouped by include literal (or by path relative
    /// to the include root in the fallback case).
    pub fn collect_header_map(
        &self,
        task_path: &str,
        include_roots: &[PathBuf],
        compilation: &IncrementalCompilation,
    ) -> Result<BTreeMap<String, BTreeSet<PathBuf>>, IncrementalError> {
        if compilation.is_macro_include_used_in_sources() {
            info!(
                task = %task_path,
                "cannot determine header dependencies because a macro include could not be \
                 resolved; treating every file under the include roots as an input"
            );
            return visit_include_roots(include_roots);
        }
        let mut headers = BTreeMap::new();
        for (include, files) in compilation.existing_headers() {
            let files: BTreeSet<PathBuf> = files.iter().filter(|f| f.is_file()).cloned().collect();
            if !files.is_empty() {
                headers.insert(include.clone(), files);
            }
        }
        Ok(headers)
    }

    /// Flattens resolved headers, keeping only those still present on disk.
    pub fn collect_existing_header_dependencies(
        &self,
        existing_headers: &BTreeMap<String, BTreeSet<PathBuf>>,
    ) -> BTreeSet<PathBuf> {
        existing_headers
            .values()
            .flatten()
            .filter(|path| path.is_file())
            .cloned()
            .collect()
    }
}

/// Lists every regular file below each root, keyed by its path relative to
/// the root with `/` separators. Roots that do not exist are skipped.
///
/// The same relative path may exist under several roots; all copies are
/// kept, in root order.
pub fn visit_include_roots(
    include_roots: &[PathBuf],
) -> Result<BTreeMap<String, BTreeSet<PathBuf>>, IncrementalError> {
    let mut files: BTreeMap<String, BTreeSet<PathBuf>> = BTreeMap::new();
    for root in include_roots {
        if !root.is_dir() {
            debug!(root = %root.display(), "include root does not exist, skipping");
            continue;
        }
        let mut found = Vec::new();
        walk(root, &mut found).map_err(|source| IncrementalError::IncludeRootScan {
            path: root.clone(),
            source,
        })?;
        for path in found {
            let relative = relative_key(root, &path);
            files.entry(relative).or_default().insert(path);
        }
    }
    Ok(files)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
