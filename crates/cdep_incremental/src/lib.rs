//! Incremental change detection for C, C++ and Objective-C compilation.
//!
//! Given the sources of a compile task, its header search roots and its
//! compiler macros, this crate decides which sources must be recompiled and
//! which headers the build should treat as inputs:
//!
//! - [`parser`] extracts `#include`/`#import`/`#define` directives from text
//! - [`resolver`] maps directives to header files through the search path
//! - [`processor`] walks include graphs against the previous
//!   [`CompilationState`](cdep_cache::CompilationState) and computes the
//!   [`IncrementalCompilation`]
//! - [`collector`] and [`header_file`] flatten the result into header inputs
//! - [`depend`] and [`compiler`] wire everything into a task action

#![warn(missing_docs)]

pub mod collector;
pub mod compilation;
pub mod compiler;
pub mod depend;
pub mod error;
pub mod guard;
pub mod header_file;
pub mod lookup;
pub mod parser;
pub mod processor;
pub mod resolver;

pub use collector::HeaderDependenciesCollector;
pub use compilation::IncrementalCompilation;
pub use compiler::{
    CompileError, CompileSpec, Compiler, DefaultCompileSpec, IncrementalNativeCompiler, WorkResult,
};
pub use depend::{DependOutcome, DependSpec, DependTask};
pub use error::IncrementalError;
pub use guard::KeyGuard;
pub use lookup::PathLookup;
pub use parser::{CSourceParser, RegexCSourceParser, SourceIncludesParser};
pub use processor::IncrementalCompileProcessor;
pub use resolver::{IncludesResolution, SourceIncludesResolver};
