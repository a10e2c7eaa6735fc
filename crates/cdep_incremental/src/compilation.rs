//! The result of change detection.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use cdep_cache::CompilationState;
use cdep_common::IncludeDirectives;

/// What a compile task has to do, plus the state to persist once it is done.
///
/// Produced by [`IncrementalCompileProcessor`](crate::IncrementalCompileProcessor)
/// and immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncrementalCompilation {
    recompile: BTreeSet<PathBuf>,
    removed: BTreeSet<PathBuf>,
    existing_headers: BTreeMap<String, BTreeSet<PathBuf>>,
    macro_include_used_in_sources: bool,
    final_state: CompilationState,
}

impl IncrementalCompilation {
    pub(crate) fn new(
        recompile: BTreeSet<PathBuf>,
        removed: BTreeSet<PathBuf>,
        existing_headers: BTreeMap<String, BTreeSet<PathBuf>>,
        macro_include_used_in_sources: bool,
        final_state: CompilationState,
    ) -> Self {
        Self {
            recompile,
            removed,
            existing_headers,
            macro_include_used_in_sources,
            final_state,
        }
    }

    /// Sources that must be compiled, sorted.
    pub fn recompile(&self) -> &BTreeSet<PathBuf> {
        &self.recompile
    }

    /// Sources of the previous build that are no longer declared.
    pub fn removed(&self) -> &BTreeSet<PathBuf> {
        &self.removed
    }

    /// Resolved headers keyed by the include literal that reached them.
    pub fn existing_headers(&self) -> &BTreeMap<String, BTreeSet<PathBuf>> {
        &self.existing_headers
    }

    /// Every distinct resolved header.
    pub fn header_files(&self) -> BTreeSet<&Path> {
        self.existing_headers
            .values()
            .flatten()
            .map(PathBuf::as_path)
            .collect()
    }

    /// `true` if some macro include could not be fully resolved, so the
    /// header set may be incomplete.
    pub fn is_macro_include_used_in_sources(&self) -> bool {
        self.macro_include_used_in_sources
    }

    /// `true` if nothing needs compiling and nothing was removed.
    pub fn is_up_to_date(&self) -> bool {
        self.recompile.is_empty() && self.removed.is_empty()
    }

    /// Parsed directives of every current source, keyed by source path.
    pub fn source_file_include_directives(&self) -> BTreeMap<PathBuf, IncludeDirectives> {
        self.final_state
            .sources()
            .iter()
            .filter_map(|source| self.final_state.get_state(source))
            .map(|state| (state.path.clone(), state.directives.clone()))
            .collect()
    }

    /// The state to persist after a successful compile.
    pub fn final_state(&self) -> &CompilationState {
        &self.final_state
    }

    /// Consumes the result, returning the state to persist.
    pub fn into_final_state(self) -> CompilationState {
        self.final_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_files_are_deduplicated() {
        let mut headers = BTreeMap::new();
        headers.insert(
            "a.h".to_string(),
            BTreeSet::from([PathBuf::from("/inc/a.h")]),
        );
        headers.insert(
            "../inc/a.h".to_string(),
            BTreeSet::from([PathBuf::from("/inc/a.h")]),
        );
        let compilation = IncrementalCompilation::new(
            BTreeSet::new(),
            BTreeSet::new(),
            headers,
            false,
            CompilationState::empty(),
        );
        assert_eq!(compilation.header_files().len(), 1);
        assert!(compilation.is_up_to_date());
    }

    #[test]
    fn removed_sources_are_not_up_to_date() {
        let compilation = IncrementalCompilation::new(
            BTreeSet::new(),
            BTreeSet::from([PathBuf::from("/src/gone.c")]),
            BTreeMap::new(),
            false,
            CompilationState::empty(),
        );
        assert!(!compilation.is_up_to_date());
    }

    #[test]
    fn include_directives_cover_sources_only() {
        use cdep_cache::SourceFileState;
        use cdep_common::{ContentHash, Include, IncludeKind};

        let source = PathBuf::from("/src/a.c");
        let header = PathBuf::from("/src/a.h");
        let directives = IncludeDirectives {
            includes: vec![Include::new(IncludeKind::Quoted, "a.h")],
            macros: Vec::new(),
        };
        let mut files = BTreeMap::new();
        let entries = [
            (&source, directives.clone()),
            (&header, IncludeDirectives::default()),
        ];
        for (path, directives) in entries {
            files.insert(
                path.clone(),
                SourceFileState {
                    path: path.clone(),
                    hash: ContentHash::from_bytes(path.to_string_lossy().as_bytes()),
                    directives,
                    resolved: Vec::new(),
                },
            );
        }
        let state = CompilationState::new(
            ContentHash::from_bytes(b"settings"),
            BTreeSet::from([source.clone()]),
            files,
        );
        let compilation =
            IncrementalCompilation::new(BTreeSet::new(), BTreeSet::new(), BTreeMap::new(), false, state);

        let map = compilation.source_file_include_directives();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&source], directives);
    }
}
