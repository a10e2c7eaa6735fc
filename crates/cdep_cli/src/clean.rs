//! `cdep clean`: forget stored compilation state.

use std::error::Error;

use crate::project::Project;
use crate::{CleanArgs, GlobalArgs};

/// Runs the `cdep clean` command. The next `cdep depend` of a cleaned task
/// recompiles everything.
pub fn run(args: &CleanArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let project = Project::open(global)?;
    for name in project.task_names(&args.task) {
        if !project.config.tasks.contains_key(&name) {
            return Err(cdep_config::ConfigError::UnknownTask(name).into());
        }
        let task_path = project.task_path(&name);
        let removed = project.store.remove(&task_path)?;
        if !global.quiet {
            if removed {
                println!("{task_path}: state removed");
            } else {
                println!("{task_path}: no stored state");
            }
        }
    }
    Ok(0)
}
