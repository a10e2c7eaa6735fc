//! The depend task: change detection as a standalone build step.
//!
//! A depend task runs ahead of compilation. It computes which sources need
//! recompiling, publishes the task's header inputs (optionally as a header
//! dependencies file), and then stores the new compilation state so the next
//! run compares against it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use cdep_cache::PersistentStateCache;
use cdep_common::{ContentHasher, FileHasher, MetricsSink, NoopMetrics};
use tracing::info;

use crate::collector::HeaderDependenciesCollector;
use crate::compilation::IncrementalCompilation;
use crate::error::IncrementalError;
use crate::header_file::{write_header_dependencies_file, StateBackedHasher};
use crate::lookup::PathLookup;
use crate::parser::{CSourceParser, RegexCSourceParser, SourceIncludesParser};
use crate::processor::IncrementalCompileProcessor;
use crate::resolver::SourceIncludesResolver;

/// Inputs of one depend task.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependSpec {
    /// Unique task identity, also the state store key.
    pub task_path: String,
    /// Declared source files.
    pub sources: Vec<PathBuf>,
    /// Ordered header search roots.
    pub include_roots: Vec<PathBuf>,
    /// Whether `#import` takes part in resolution.
    pub imports_are_includes: bool,
    /// Compiler macro definitions.
    pub macros: BTreeMap<String, String>,
    /// Where to write the header dependencies file, if anywhere.
    pub header_dependencies_file: Option<PathBuf>,
}

/// What a depend task found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependOutcome {
    /// Sources to compile.
    pub recompile: BTreeSet<PathBuf>,
    /// Sources that disappeared since the last run.
    pub removed: BTreeSet<PathBuf>,
    /// Header inputs of the compile task.
    pub header_dependencies: BTreeSet<PathBuf>,
    /// `true` if the header inputs are every file under the include roots
    /// because some macro include could not be resolved.
    pub macro_include_used_in_sources: bool,
}

/// Runs change detection for one [`DependSpec`].
pub struct DependTask {
    spec: DependSpec,
    parser: Arc<dyn CSourceParser>,
    lookup: Arc<PathLookup>,
    hasher: Arc<dyn FileHasher>,
    metrics: Arc<dyn MetricsSink>,
}

impl DependTask {
    /// Creates a task with the default parser, hasher and a private lookup.
    pub fn new(spec: DependSpec) -> Self {
        Self {
            spec,
            parser: Arc::new(RegexCSourceParser::new()),
            lookup: Arc::new(PathLookup::default()),
            hasher: Arc::new(ContentHasher),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Shares `lookup` with other tasks of the same build.
    pub fn with_lookup(mut self, lookup: Arc<PathLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    /// Replaces the file hasher.
    pub fn with_hasher(mut self, hasher: Arc<dyn FileHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Replaces the source parser.
    pub fn with_parser(mut self, parser: Arc<dyn CSourceParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Reports operation timings to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The task's inputs.
    pub fn spec(&self) -> &DependSpec {
        &self.spec
    }

    /// Builds the processor for this task.
    pub fn processor(&self) -> IncrementalCompileProcessor {
        IncrementalCompileProcessor::new(
            self.spec.task_path.clone(),
            SourceIncludesParser::new(Arc::clone(&self.parser), self.spec.imports_are_includes),
            SourceIncludesResolver::new(self.spec.include_roots.clone(), Arc::clone(&self.lookup)),
            Arc::clone(&self.hasher),
            &self.spec.macros,
        )
        .with_metrics(Arc::clone(&self.metrics))
    }

    /// Computes the incremental compilation without storing anything.
    ///
    /// The path lookup is cleared first, since files may have changed since
    /// the previous task ran.
    pub fn analyze(
        &self,
        cache: &dyn PersistentStateCache,
    ) -> Result<IncrementalCompilation, IncrementalError> {
        self.lookup.clear();
        self.processor().process_source_files(cache, &self.spec.sources)
    }

    /// Detects header dependencies, writes the header dependencies file if
    /// configured, and stores the new state in `cache`.
    ///
    /// Nothing is stored unless every earlier step succeeded.
    pub fn detect_headers(
        &self,
        cache: &dyn PersistentStateCache,
    ) -> Result<DependOutcome, IncrementalError> {
        let task = self.spec.task_path.as_str();
        let compilation = self.analyze(cache)?;
        let headers = HeaderDependenciesCollector::new().collect_header_map(
            task,
            &self.spec.include_roots,
            &compilation,
        )?;

        if let Some(path) = &self.spec.header_dependencies_file {
            let hasher = StateBackedHasher::new(compilation.final_state(), self.hasher.as_ref());
            write_header_dependencies_file(path, &headers, &hasher)?;
        }

        cache
            .set(compilation.final_state())
            .map_err(|source| IncrementalError::StateStore {
                task: task.to_string(),
                source,
            })?;

        let header_dependencies: BTreeSet<PathBuf> = headers.into_values().flatten().collect();
        info!(
            task = %task,
            sources = self.spec.sources.len(),
            recompile = compilation.recompile().len(),
            removed = compilation.removed().len(),
            headers = header_dependencies.len(),
            "header dependencies detected"
        );
        Ok(DependOutcome {
            recompile: compilation.recompile().clone(),
            removed: compilation.removed().clone(),
            header_dependencies,
            macro_include_used_in_sources: compilation.is_macro_include_used_in_sources(),
        })
    }
}

impl std::fmt::Debug for DependTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependTask")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}
