//! `cdep status`: show what `cdep depend` would find, without storing state.

use std::error::Error;
use std::sync::Arc;

use cdep_cache::StateCacheFactory;
use cdep_common::MetricsSink;
use cdep_incremental::{DependTask, HeaderDependenciesCollector, PathLookup};

use crate::depend::Summary;
use crate::project::{depend_spec, Project};
use crate::{GlobalArgs, StatusArgs};

/// Runs the `cdep status` command.
///
/// Returns exit code 0 if every task is up to date, 2 if some task has work
/// pending.
pub fn run(
    args: &StatusArgs,
    global: &GlobalArgs,
    metrics: Arc<dyn MetricsSink>,
) -> Result<i32, Box<dyn Error>> {
    let project = Project::open(global)?;
    let factory = StateCacheFactory::new(Arc::clone(&project.store));
    let lookup = Arc::new(PathLookup::default());
    let collector = HeaderDependenciesCollector::new();
    let mut pending = false;

    for name in project.task_names(&args.task) {
        let task = project.resolve(&name)?;
        let cache = factory.create(&task.path);
        let compilation = DependTask::new(depend_spec(&task))
            .with_lookup(Arc::clone(&lookup))
            .with_metrics(Arc::clone(&metrics))
            .analyze(&cache)?;
        let headers =
            collector.collect_header_dependencies(&task.path, &task.include_roots, &compilation)?;
        pending |= !compilation.is_up_to_date();

        if !global.quiet {
            let summary = Summary {
                task: &task.path,
                sources: task.sources.len(),
                recompile: compilation.recompile(),
                removed: compilation.removed(),
                headers: headers.len(),
                macro_fallback: compilation.is_macro_include_used_in_sources(),
            };
            summary.print(&project.dir, args.list);
        }
    }
    Ok(if pending { 2 } else { 0 })
}
