//! Logging setup for `cdep` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--verbose` (debug) or `--quiet` (error)
//! 2. `CDEP_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`

use tracing::Level;
use tracing_subscriber::fmt;

use crate::GlobalArgs;

/// Environment variable consulted when no verbosity flag is given.
pub const LOG_ENV: &str = "CDEP_LOG";

/// Installs the global subscriber. Call once, at startup.
pub fn init_logging(global: &GlobalArgs) {
    let level = level_for(global, std::env::var(LOG_ENV).ok().as_deref());
    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn level_for(global: &GlobalArgs, env: Option<&str>) -> Level {
    if global.verbose {
        return Level::DEBUG;
    }
    if global.quiet {
        return Level::ERROR;
    }
    env.and_then(parse_level_str).unwrap_or(Level::INFO)
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
