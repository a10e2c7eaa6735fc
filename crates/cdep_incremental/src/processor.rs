//! The change-detection pass.
//!
//! For each declared source the processor walks its include graph depth
//! first, snapshotting every file it reaches (content hash, parsed
//! directives, resolution results) exactly once per pass. A source is
//! recompiled when any file it reaches differs from the previous build's
//! snapshot, either in content or in what its includes resolved to.
//!
//! Macros visible to a macro include are the configured macros plus every
//! `#define` seen so far in the current source's traversal. A header with
//! macro includes is therefore re-resolved each time it is reached, and its
//! recorded resolutions are the union over all traversals.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use cdep_cache::{CompilationState, PersistentStateCache, ResolvedInclude, SourceFileState};
use cdep_common::{
    normalize_path, ContentHash, FileHasher, IncludeDirectives, MacroTable, MetricsSink,
    NoopMetrics, Operation,
};
use tracing::{debug, warn};

use crate::compilation::IncrementalCompilation;
use crate::error::IncrementalError;
use crate::parser::SourceIncludesParser;
use crate::resolver::SourceIncludesResolver;

/// Computes an [`IncrementalCompilation`] for one task.
pub struct IncrementalCompileProcessor {
    task_path: String,
    parser: SourceIncludesParser,
    resolver: SourceIncludesResolver,
    hasher: Arc<dyn FileHasher>,
    macros: MacroTable,
    settings: ContentHash,
    metrics: Arc<dyn MetricsSink>,
}

impl IncrementalCompileProcessor {
    /// Creates a processor for the task at `task_path`.
    ///
    /// `macros` are the compiler's `-D` definitions; they are visible to every
    /// macro include of every source.
    pub fn new(
        task_path: impl Into<String>,
        parser: SourceIncludesParser,
        resolver: SourceIncludesResolver,
        hasher: Arc<dyn FileHasher>,
        macros: &BTreeMap<String, String>,
    ) -> Self {
        let settings = settings_fingerprint(
            resolver.include_roots(),
            parser.imports_are_includes(),
            macros,
        );
        Self {
            task_path: task_path.into(),
            parser,
            resolver,
            hasher,
            macros: MacroTable::from_pairs(macros),
            settings,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Reports operation timings to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The task this processor works for.
    pub fn task_path(&self) -> &str {
        &self.task_path
    }

    /// Fingerprint of the settings that shape resolution.
    pub fn settings(&self) -> ContentHash {
        self.settings
    }

    /// Compares `sources` against the state held by `cache`.
    ///
    /// The cache is only read. Persisting the final state is the caller's
    /// job, once the compile it guards has succeeded.
    pub fn process_source_files(
        &self,
        cache: &dyn PersistentStateCache,
        sources: &[PathBuf],
    ) -> Result<IncrementalCompilation, IncrementalError> {
        let previous = cache.get();
        self.process_against(&previous, sources)
    }

    /// Compares `sources` against `previous`.
    pub fn process_against(
        &self,
        previous: &CompilationState,
        sources: &[PathBuf],
    ) -> Result<IncrementalCompilation, IncrementalError> {
        let start = Instant::now();
        let sources = self.absolute_sources(sources)?;

        let mut pass = SourceProcessor {
            processor: self,
            previous,
            reuse_previous: previous.settings() == Some(self.settings),
            files: BTreeMap::new(),
            unreadable: BTreeSet::new(),
            reachable: BTreeMap::new(),
            incomplete: false,
        };
        for source in &sources {
            pass.snapshot(source, true)?;
        }
        for source in &sources {
            pass.visit_source(source);
        }
        let compilation = pass.finish(sources);

        self.metrics.record(Operation::Analysis, start.elapsed());
        debug!(
            task = %self.task_path,
            recompile = compilation.recompile().len(),
            removed = compilation.removed().len(),
            files = compilation.final_state().len(),
            macro_include_used = compilation.is_macro_include_used_in_sources(),
            "change detection finished"
        );
        Ok(compilation)
    }

    fn absolute_sources(&self, sources: &[PathBuf]) -> Result<BTreeSet<PathBuf>, IncrementalError> {
        sources
            .iter()
            .map(|source| {
                std::path::absolute(source)
                    .map(|p| normalize_path(&p))
                    .map_err(|err| IncrementalError::SourceUnreadable {
                        task: self.task_path.clone(),
                        path: source.clone(),
                        source: err,
                    })
            })
            .collect()
    }
}

impl std::fmt::Debug for IncrementalCompileProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalCompileProcessor")
            .field("task_path", &self.task_path)
            .field("resolver", &self.resolver)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Hashes everything that changes how includes resolve. Root order matters.
fn settings_fingerprint(
    include_roots: &[PathBuf],
    imports_are_includes: bool,
    macros: &BTreeMap<String, String>,
) -> ContentHash {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"roots\0");
    for root in include_roots {
        buf.extend_from_slice(root.to_string_lossy().as_bytes());
        buf.push(0);
    }
    buf.extend_from_slice(b"imports\0");
    buf.push(u8::from(imports_are_includes));
    buf.extend_from_slice(b"\0macros\0");
    for (name, value) in macros {
        buf.extend_from_slice(name.as_bytes());
        buf.push(b'=');
        buf.extend_from_slice(value.as_bytes());
        buf.push(0);
    }
    ContentHash::from_bytes(&buf)
}

/// A snapshot under construction.
struct FileEntry {
    hash: ContentHash,
    directives: IncludeDirectives,
    resolved: Vec<ResolvedInclude>,
    resolved_once: bool,
}

/// State of a single pass over a task's sources.
struct SourceProcessor<'a> {
    processor: &'a IncrementalCompileProcessor,
    previous: &'a CompilationState,
    /// Parsed directives of unchanged files can be taken from `previous`.
    reuse_previous: bool,
    files: BTreeMap<PathBuf, FileEntry>,
    /// Headers that resolved but could not be read.
    unreadable: BTreeSet<PathBuf>,
    /// Every file reached from each source, the source included.
    reachable: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    incomplete: bool,
}

impl SourceProcessor<'_> {
    /// Ensures `path` has a snapshot. Returns `false` for unreadable headers;
    /// unreadable sources are an error.
    fn snapshot(&mut self, path: &Path, is_source: bool) -> Result<bool, IncrementalError> {
        if self.files.contains_key(path) {
            return Ok(true);
        }
        if self.unreadable.contains(path) {
            return Ok(false);
        }

        let start = Instant::now();
        let entry = self.read_entry(path);
        self.processor.metrics.record(Operation::Snapshot, start.elapsed());

        match entry {
            Ok(entry) => {
                self.files.insert(path.to_path_buf(), entry);
                Ok(true)
            }
            Err(err) if is_source => Err(IncrementalError::SourceUnreadable {
                task: self.processor.task_path.clone(),
                path: path.to_path_buf(),
                source: err,
            }),
            Err(err) => {
                warn!(
                    task = %self.processor.task_path,
                    header = %path.display(),
                    "cannot read header, treating it as changed: {}",
                    err
                );
                self.unreadable.insert(path.to_path_buf());
                Ok(false)
            }
        }
    }

    fn read_entry(&self, path: &Path) -> io::Result<FileEntry> {
        let hash = self.processor.hasher.hash(path)?;
        let directives = match self.previous.get_state(path) {
            Some(prev) if self.reuse_previous && prev.hash == hash => prev.directives.clone(),
            _ => {
                let bytes = fs::read(path)?;
                self.processor
                    .parser
                    .parse_includes(&String::from_utf8_lossy(&bytes))
            }
        };
        Ok(FileEntry {
            hash,
            directives,
            resolved: Vec::new(),
            resolved_once: false,
        })
    }

    /// Walks the include graph of `source` in depth-first preorder.
    fn visit_source(&mut self, source: &Path) {
        let mut macros = self.processor.macros.clone();
        let mut visited = BTreeSet::new();
        let mut stack = vec![source.to_path_buf()];

        while let Some(path) = stack.pop() {
            if !visited.insert(path.clone()) {
                continue;
            }
            // Sources were snapshotted up front, so only headers can fail here.
            if !matches!(self.snapshot(&path, false), Ok(true)) {
                continue;
            }
            let Some(entry) = self.files.get_mut(&path) else {
                continue;
            };

            macros.extend_from(&entry.directives);
            if !entry.resolved_once || entry.directives.has_macro_includes() {
                let resolution =
                    self.processor
                        .resolver
                        .resolve_includes(&path, &entry.directives, &macros);
                if !resolution.complete {
                    debug!(
                        task = %self.processor.task_path,
                        file = %path.display(),
                        "macro include could not be fully resolved"
                    );
                    self.incomplete = true;
                }
                for resolved in resolution.resolved {
                    if !entry.resolved.contains(&resolved) {
                        entry.resolved.push(resolved);
                    }
                }
                entry.resolved_once = true;
            }

            let children: Vec<PathBuf> = entry
                .resolved
                .iter()
                .filter_map(ResolvedInclude::file)
                .filter(|child| !visited.contains(*child))
                .map(Path::to_path_buf)
                .collect();
            stack.extend(children.into_iter().rev());
        }
        self.reachable.insert(source.to_path_buf(), visited);
    }

    fn finish(self, sources: BTreeSet<PathBuf>) -> IncrementalCompilation {
        let SourceProcessor {
            processor,
            previous,
            files,
            unreadable,
            reachable,
            incomplete,
            ..
        } = self;
        let task = processor.task_path.as_str();
        let settings_changed = previous.settings() != Some(processor.settings);
        if settings_changed && !previous.is_empty() {
            debug!(task = %task, "resolution settings changed, recompiling everything");
        }

        let files: BTreeMap<PathBuf, SourceFileState> = files
            .into_iter()
            .map(|(path, entry)| {
                let state = SourceFileState {
                    path: path.clone(),
                    hash: entry.hash,
                    directives: entry.directives,
                    resolved: entry.resolved,
                };
                (path, state)
            })
            .collect();

        let is_changed = |path: &Path| {
            if unreadable.contains(path) {
                return true;
            }
            match (previous.get_state(path), files.get(path)) {
                (Some(prev), Some(cur)) => prev.hash != cur.hash || prev.resolved != cur.resolved,
                _ => true,
            }
        };

        let mut recompile = BTreeSet::new();
        for source in &sources {
            let changed = settings_changed
                || !previous.is_source(source)
                || reachable
                    .get(source)
                    .map_or(true, |reached| reached.iter().any(|f| is_changed(f.as_path())));
            if changed {
                debug!(task = %task, source = %source.display(), "source needs recompilation");
                recompile.insert(source.clone());
            }
        }

        let removed: BTreeSet<PathBuf> = previous.sources().difference(&sources).cloned().collect();
        for source in &removed {
            debug!(task = %task, source = %source.display(), "source was removed");
        }

        let mut existing_headers: BTreeMap<String, BTreeSet<PathBuf>> = BTreeMap::new();
        for state in files.values() {
            for resolved in &state.resolved {
                if let Some(file) = resolved.file() {
                    if !unreadable.contains(file) {
                        existing_headers
                            .entry(resolved.candidate.clone())
                            .or_default()
                            .insert(file.to_path_buf());
                    }
                }
            }
        }

        let final_state = CompilationState::new(processor.settings, sources, files);
        IncrementalCompilation::new(recompile, removed, existing_headers, incomplete, final_state)
    }
}
