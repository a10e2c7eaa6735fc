//! `cdep depend`: detect header dependencies and record compilation state.
//!
//! For every selected task:
//!
//! 1. Resolve sources and include roots from `cdep.toml`
//! 2. Compare them against the task's stored state
//! 3. Write the header dependencies file, if configured
//! 4. Store the new state

use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cdep_cache::StateCacheFactory;
use cdep_common::MetricsSink;
use cdep_incremental::{DependTask, PathLookup};

use crate::project::{depend_spec, display_path, Project};
use crate::{DependArgs, GlobalArgs};

/// Runs the `cdep depend` command. Returns exit code 0 on success.
pub fn run(
    args: &DependArgs,
    global: &GlobalArgs,
    metrics: Arc<dyn MetricsSink>,
) -> Result<i32, Box<dyn Error>> {
    let project = Project::open(global)?;
    let factory = StateCacheFactory::new(Arc::clone(&project.store));
    let lookup = Arc::new(PathLookup::default());

    for name in project.task_names(&args.task) {
        let task = project.resolve(&name)?;
        let cache = factory.create(&task.path);
        let outcome = DependTask::new(depend_spec(&task))
            .with_lookup(Arc::clone(&lookup))
            .with_metrics(Arc::clone(&metrics))
            .detect_headers(&cache)?;

        if !global.quiet {
            let summary = Summary {
                task: &task.path,
                sources: task.sources.len(),
                recompile: &outcome.recompile,
                removed: &outcome.removed,
                headers: outcome.header_dependencies.len(),
                macro_fallback: outcome.macro_include_used_in_sources,
            };
            summary.print(&project.dir, args.list);
        }
    }
    Ok(0)
}

/// What one task's change detection found, for printing.
pub struct Summary<'a> {
    /// Task path.
    pub task: &'a str,
    /// Number of declared sources.
    pub sources: usize,
    /// Sources to recompile.
    pub recompile: &'a BTreeSet<PathBuf>,
    /// Removed sources.
    pub removed: &'a BTreeSet<PathBuf>,
    /// Number of header dependencies.
    pub headers: usize,
    /// Whether the header set fell back to every include root file.
    pub macro_fallback: bool,
}

impl Summary<'_> {
    /// Prints the summary, listing individual files when `list` is set.
    pub fn print(&self, base: &Path, list: bool) {
        println!("{}", self.headline());
        if list {
            for source in self.recompile {
                println!("    recompile {}", display_path(source, base));
            }
            for source in self.removed {
                println!("    removed   {}", display_path(source, base));
            }
        }
    }

    fn headline(&self) -> String {
        let mut line = format!(
            "{}: {} of {} sources to recompile, {} removed, {} header dependencies",
            self.task,
            self.recompile.len(),
            self.sources,
            self.removed.len(),
            self.headers
        );
        if self.macro_fallback {
            line.push_str(" (all include root files, unresolved macro include)");
        }
        line
    }
}
