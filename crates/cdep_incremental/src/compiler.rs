//! Wrapping a native compiler with change detection.
//!
//! [`IncrementalNativeCompiler`] sits in front of a real [`Compiler`]. For an
//! incremental compile it narrows the [`CompileSpec`] to the sources that changed and
//! hands over the removed ones; otherwise it empties the object directory and
//! compiles everything. Either way the new compilation state is stored only
//! after the delegate has succeeded.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use cdep_cache::{CacheError, PersistentStateCache};
use cdep_common::{IncludeDirectives, MetricsSink, NoopMetrics, Operation};
use tracing::debug;

use crate::compilation::IncrementalCompilation;

/// Whether a compile step did anything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkResult {
    /// `true` if outputs were produced or removed.
    pub did_work: bool,
}

impl WorkResult {
    /// Work was done.
    pub const DID_WORK: WorkResult = WorkResult { did_work: true };
    /// Nothing was done.
    pub const DID_NO_WORK: WorkResult = WorkResult { did_work: false };

    /// Combines two results; work was done if either did work.
    pub fn or(self, other: WorkResult) -> WorkResult {
        WorkResult {
            did_work: self.did_work || other.did_work,
        }
    }
}

/// Errors raised while compiling.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The underlying compiler failed.
    #[error("compilation failed: {0}")]
    Failed(String),

    /// Stale outputs could not be removed before a full compile.
    #[error("failed to clean object directory {}: {source}", .path.display())]
    Clean {
        /// The entry that could not be removed.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The compile succeeded but the new state could not be stored.
    #[error("failed to store compilation state: {0}")]
    State(#[from] CacheError),
}

/// The parts of a compile specification change detection touches.
pub trait CompileSpec {
    /// Sources to compile.
    fn source_files(&self) -> &[PathBuf];

    /// Replaces the sources to compile.
    fn set_source_files(&mut self, sources: Vec<PathBuf>);

    /// Sources whose outputs must be deleted.
    fn removed_source_files(&self) -> &[PathBuf];

    /// Replaces the sources whose outputs must be deleted.
    fn set_removed_source_files(&mut self, removed: Vec<PathBuf>);

    /// Hands over the parsed directives of each source, so the compiler need
    /// not parse them again.
    fn set_source_file_include_directives(
        &mut self,
        directives: BTreeMap<PathBuf, IncludeDirectives>,
    );

    /// `true` if previous outputs may be reused.
    fn is_incremental_compile(&self) -> bool;

    /// Directory holding the object files.
    fn object_file_dir(&self) -> &Path;
}

/// A plain [`CompileSpec`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DefaultCompileSpec {
    /// Sources to compile.
    pub source_files: Vec<PathBuf>,
    /// Sources whose outputs must be deleted.
    pub removed_source_files: Vec<PathBuf>,
    /// Parsed directives of each source.
    pub source_file_include_directives: BTreeMap<PathBuf, IncludeDirectives>,
    /// `true` if previous outputs may be reused.
    pub incremental_compile: bool,
    /// Directory holding the object files.
    pub object_file_dir: PathBuf,
}

impl CompileSpec for DefaultCompileSpec {
    fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    fn set_source_files(&mut self, sources: Vec<PathBuf>) {
        self.source_files = sources;
    }

    fn removed_source_files(&self) -> &[PathBuf] {
        &self.removed_source_files
    }

    fn set_removed_source_files(&mut self, removed: Vec<PathBuf>) {
        self.removed_source_files = removed;
    }

    fn set_source_file_include_directives(
        &mut self,
        directives: BTreeMap<PathBuf, IncludeDirectives>,
    ) {
        self.source_file_include_directives = directives;
    }

    fn is_incremental_compile(&self) -> bool {
        self.incremental_compile
    }

    fn object_file_dir(&self) -> &Path {
        &self.object_file_dir
    }
}

/// Something that compiles a spec.
pub trait Compiler<S: CompileSpec> {
    /// Compiles `spec`.
    fn execute(&mut self, spec: &mut S) -> Result<WorkResult, CompileError>;
}

/// A [`Compiler`] that only compiles what changed.
pub struct IncrementalNativeCompiler<'a, C> {
    compilation: IncrementalCompilation,
    state_cache: &'a dyn PersistentStateCache,
    delegate: C,
    metrics: Arc<dyn MetricsSink>,
}

impl<'a, C> IncrementalNativeCompiler<'a, C> {
    /// Wraps `delegate`. `compilation` must come from a processor run against
    /// `state_cache`.
    pub fn new(
        compilation: IncrementalCompilation,
        state_cache: &'a dyn PersistentStateCache,
        delegate: C,
    ) -> Self {
        Self {
            compilation,
            state_cache,
            delegate,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Reports operation timings to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The wrapped compiler.
    pub fn delegate(&self) -> &C {
        &self.delegate
    }
}

impl<S, C> Compiler<S> for IncrementalNativeCompiler<'_, C>
where
    S: CompileSpec,
    C: Compiler<S>,
{
    fn execute(&mut self, spec: &mut S) -> Result<WorkResult, CompileError> {
        let start = Instant::now();
        spec.set_source_file_include_directives(self.compilation.source_file_include_directives());
        let result = if spec.is_incremental_compile() {
            self.incremental_compile(spec)
        } else {
            self.clean_compile(spec)
        };
        self.metrics.record(Operation::CompileProcessing, start.elapsed());
        let result = result?;

        self.state_cache.set(self.compilation.final_state())?;
        Ok(result)
    }
}

impl<C> IncrementalNativeCompiler<'_, C> {
    fn incremental_compile<S>(&mut self, spec: &mut S) -> Result<WorkResult, CompileError>
    where
        S: CompileSpec,
        C: Compiler<S>,
    {
        spec.set_source_files(self.compilation.recompile().iter().cloned().collect());
        spec.set_removed_source_files(self.compilation.removed().iter().cloned().collect());
        debug!(
            recompile = spec.source_files().len(),
            removed = spec.removed_source_files().len(),
            "incremental compile"
        );
        self.run_delegate(spec)
    }

    fn clean_compile<S>(&mut self, spec: &mut S) -> Result<WorkResult, CompileError>
    where
        S: CompileSpec,
        C: Compiler<S>,
    {
        let deleted = clean_directory(spec.object_file_dir())?;
        debug!(
            deleted,
            sources = spec.source_files().len(),
            "full compile"
        );
        let compiled = self.run_delegate(spec)?;
        Ok(compiled.or(WorkResult {
            did_work: deleted > 0,
        }))
    }

    fn run_delegate<S>(&mut self, spec: &mut S) -> Result<WorkResult, CompileError>
    where
        S: CompileSpec,
        C: Compiler<S>,
    {
        let start = Instant::now();
        let result = self.delegate.execute(spec);
        self.metrics.record(Operation::CompileExecution, start.elapsed());
        result
    }
}

/// Removes everything inside `dir`, keeping `dir` itself. Returns the number
/// of top-level entries removed. A missing directory counts as empty.
fn clean_directory(dir: &Path) -> Result<usize, CompileError> {
    let to_error = |path: &Path, source: io::Error| CompileError::Clean {
        path: path.to_path_buf(),
        source,
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(to_error(dir, err)),
    };

    let mut deleted = 0;
    for entry in entries {
        let entry = entry.map_err(|e| to_error(dir, e))?;
        let path = entry.path();
        let is_dir = entry.file_type().map_err(|e| to_error(&path, e))?.is_dir();
        let removed = if is_dir {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| to_error(&path, e))?;
        deleted += 1;
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdep_cache::{CompilationState, InMemoryStateCache};
    use std::collections::{BTreeMap, BTreeSet};

    #[derive(Default)]
    struct RecordingCompiler {
        calls: Vec<(Vec<PathBuf>, Vec<PathBuf>)>,
        fail: bool,
    }

    impl Compiler<DefaultCompileSpec> for RecordingCompiler {
        fn execute(&mut self, spec: &mut DefaultCompileSpec) -> Result<WorkResult, CompileError> {
            self.calls
                .push((spec.source_files.clone(), spec.removed_source_files.clone()));
            if self.fail {
                return Err(CompileError::Failed("syntax error".to_string()));
            }
            Ok(WorkResult {
                did_work: !spec.source_files.is_empty(),
            })
        }
    }

    fn compilation(recompile: &[&str], removed: &[&str]) -> IncrementalCompilation {
        let state = CompilationState::new(
            cdep_common::ContentHash::from_bytes(b"settings"),
            BTreeSet::from([PathBuf::from("/src/a.c")]),
            BTreeMap::new(),
        );
        IncrementalCompilation::new(
            recompile.iter().map(PathBuf::from).collect(),
            removed.iter().map(PathBuf::from).collect(),
            BTreeMap::new(),
            false,
            state,
        )
    }

    #[test]
    fn incremental_compile_narrows_sources() {
        let cache = InMemoryStateCache::new();
        let mut compiler = IncrementalNativeCompiler::new(
            compilation(&["/src/a.c"], &["/src/old.c"]),
            &cache,
            RecordingCompiler::default(),
        );
        let mut spec = DefaultCompileSpec {
            source_files: vec![PathBuf::from("/src/a.c"), PathBuf::from("/src/b.c")],
            incremental_compile: true,
            ..Default::default()
        };

        let result = compiler.execute(&mut spec).unwrap();
        assert!(result.did_work);
        assert_eq!(
            compiler.delegate().calls,
            vec![(vec![PathBuf::from("/src/a.c")], vec![PathBuf::from("/src/old.c")])]
        );
        assert!(cache.get().is_source(Path::new("/src/a.c")));
    }

    #[test]
    fn source_directives_are_handed_to_the_delegate() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.c");
        fs::write(&source, "#include \"a.h\"\n").unwrap();
        let task = crate::DependTask::new(crate::DependSpec {
            task_path: ":app:compileC".to_string(),
            sources: vec![source.clone()],
            ..Default::default()
        });
        let cache = InMemoryStateCache::new();
        let compilation = task.analyze(&cache).unwrap();

        let mut compiler =
            IncrementalNativeCompiler::new(compilation, &cache, RecordingCompiler::default());
        let mut spec = DefaultCompileSpec {
            source_files: vec![source.clone()],
            incremental_compile: true,
            ..Default::default()
        };
        compiler.execute(&mut spec).unwrap();

        let directives = &spec.source_file_include_directives[&source];
        assert_eq!(directives.includes.len(), 1);
        assert_eq!(directives.includes[0].value, "a.h");
    }

    #[test]
    fn full_compile_cleans_object_dir() {
        let dir = tempfile::tempdir().unwrap();
        let objects = dir.path().join("obj");
        fs::create_dir_all(objects.join("nested")).unwrap();
        fs::write(objects.join("stale.o"), "").unwrap();
        fs::write(objects.join("nested/x.o"), "").unwrap();

        let cache = InMemoryStateCache::new();
        let mut compiler =
            IncrementalNativeCompiler::new(compilation(&[], &[]), &cache, RecordingCompiler::default());
        let mut spec = DefaultCompileSpec {
            source_files: vec![],
            incremental_compile: false,
            object_file_dir: objects.clone(),
            ..Default::default()
        };

        let result = compiler.execute(&mut spec).unwrap();
        assert!(result.did_work, "deleting outputs counts as work");
        assert!(objects.is_dir());
        assert_eq!(fs::read_dir(&objects).unwrap().count(), 0);
    }

    #[test]
    fn full_compile_with_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InMemoryStateCache::new();
        let mut compiler =
            IncrementalNativeCompiler::new(compilation(&[], &[]), &cache, RecordingCompiler::default());
        let mut spec = DefaultCompileSpec {
            incremental_compile: false,
            object_file_dir: dir.path().join("missing"),
            ..Default::default()
        };
        assert_eq!(compiler.execute(&mut spec).unwrap(), WorkResult::DID_NO_WORK);
    }

    #[test]
    fn failed_compile_keeps_previous_state() {
        let cache = InMemoryStateCache::new();
        let delegate = RecordingCompiler {
            fail: true,
            ..Default::default()
        };
        let mut compiler =
            IncrementalNativeCompiler::new(compilation(&["/src/a.c"], &[]), &cache, delegate);
        let mut spec = DefaultCompileSpec {
            incremental_compile: true,
            ..Default::default()
        };

        let err = compiler.execute(&mut spec).unwrap_err();
        assert!(matches!(err, CompileError::Failed(_)));
        assert!(cache.get().is_empty());
    }

    #[test]
    fn work_result_or() {
        assert!(WorkResult::DID_NO_WORK.or(WorkResult::DID_WORK).did_work);
        assert!(!WorkResult::DID_NO_WORK.or(WorkResult::DID_NO_WORK).did_work);
    }
}
