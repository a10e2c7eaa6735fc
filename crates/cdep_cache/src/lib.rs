//! Persistent compilation state for incremental native builds.
//!
//! This crate defines the per-file snapshot model recorded after each build
//! and the keyed store that persists it between builds. Reads are fail-safe:
//! a missing or damaged state file yields an empty state, which simply forces
//! a full recompile.

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod state;
pub mod store;

pub use error::CacheError;
pub use state::{CompilationState, Resolution, ResolvedInclude, SourceFileState};
pub use store::{
    InMemoryStateCache, PersistentStateCache, StateCacheFactory, StateStore, TaskStateCache,
};
