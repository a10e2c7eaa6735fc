//! Include resolution against the header search path.
//!
//! Search order follows the compiler:
//!
//! - quoted includes try the including file's directory, then each root
//! - system includes try each root only
//! - macro includes are expanded against the visible macro table first; each
//!   literal they can expand to is then resolved as above
//!
//! The first directory containing the candidate wins. A candidate found
//! nowhere resolves to [`Resolution::Unresolved`], which is recorded so that
//! a header appearing later in the search path is noticed as a change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cdep_cache::{Resolution, ResolvedInclude};
use cdep_common::{normalize_path, Include, IncludeDirectives, IncludeKind, MacroTable};

use crate::lookup::PathLookup;
use crate::parser::parse_include_expr;

/// Upper bound on nested macro expansion (`A -> B -> "x.h"` is depth 2).
const MAX_EXPANSION_DEPTH: usize = 16;

/// Resolution results for one file's directives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncludesResolution {
    /// One entry per quoted or system directive and one per macro expansion
    /// candidate, in directive order.
    pub resolved: Vec<ResolvedInclude>,
    /// `false` if some macro include could not be fully expanded, meaning the
    /// set of headers the file really includes may be larger than `resolved`.
    pub complete: bool,
}

impl IncludesResolution {
    /// Iterates over the headers that were found.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.resolved.iter().filter_map(ResolvedInclude::file)
    }
}

/// Resolves include directives through a fixed, ordered list of roots.
#[derive(Clone, Debug)]
pub struct SourceIncludesResolver {
    include_roots: Vec<PathBuf>,
    lookup: Arc<PathLookup>,
}

impl SourceIncludesResolver {
    /// Creates a resolver. Roots are normalized; their order is the search
    /// order.
    pub fn new(include_roots: Vec<PathBuf>, lookup: Arc<PathLookup>) -> Self {
        let include_roots = include_roots.iter().map(|r| normalize_path(r)).collect();
        Self {
            include_roots,
            lookup,
        }
    }

    /// The ordered search roots.
    pub fn include_roots(&self) -> &[PathBuf] {
        &self.include_roots
    }

    /// Resolves every include of `directives`, which were parsed from
    /// `including_file`, with `macros` visible.
    pub fn resolve_includes(
        &self,
        including_file: &Path,
        directives: &IncludeDirectives,
        macros: &MacroTable,
    ) -> IncludesResolution {
        let including_dir = including_file.parent();
        let mut resolution = IncludesResolution {
            resolved: Vec::with_capacity(directives.includes.len()),
            complete: true,
        };

        for include in &directives.includes {
            match include.kind {
                IncludeKind::Quoted | IncludeKind::System => {
                    let found = self.resolve_literal(include.kind, &include.value, including_dir);
                    resolution.resolved.push(ResolvedInclude {
                        include: include.clone(),
                        candidate: include.value.clone(),
                        resolution: found,
                    });
                }
                IncludeKind::Macro => {
                    if !self.resolve_macro(include, including_dir, macros, &mut resolution.resolved) {
                        resolution.complete = false;
                    }
                }
            }
        }
        resolution
    }

    /// Resolves a macro include. Returns `false` if expansion was incomplete.
    fn resolve_macro(
        &self,
        include: &Include,
        including_dir: Option<&Path>,
        macros: &MacroTable,
        out: &mut Vec<ResolvedInclude>,
    ) -> bool {
        let mut candidates = Vec::new();
        let mut expanding = Vec::new();
        let complete = expand(&include.value, macros, &mut expanding, &mut candidates);

        for (kind, candidate) in candidates {
            let found = self.resolve_literal(kind, &candidate, including_dir);
            out.push(ResolvedInclude {
                include: include.clone(),
                candidate,
                resolution: found,
            });
        }
        if !complete {
            out.push(ResolvedInclude {
                include: include.clone(),
                candidate: String::new(),
                resolution: Resolution::Unresolved,
            });
        }
        complete
    }

    fn resolve_literal(
        &self,
        kind: IncludeKind,
        value: &str,
        including_dir: Option<&Path>,
    ) -> Resolution {
        let local = match kind {
            IncludeKind::Quoted => including_dir,
            _ => None,
        };
        for dir in local.into_iter().chain(self.include_roots.iter().map(PathBuf::as_path)) {
            let candidate = normalize_path(&dir.join(value));
            if self.lookup.is_file(&candidate) {
                return Resolution::Resolved {
                    file: candidate,
                    root: dir.to_path_buf(),
                };
            }
        }
        Resolution::Unresolved
    }
}

/// Expands `expr` into literal include candidates. Returns `false` if any
/// branch of the expansion could not reach a literal.
fn expand(
    expr: &str,
    macros: &MacroTable,
    expanding: &mut Vec<String>,
    out: &mut Vec<(IncludeKind, String)>,
) -> bool {
    if !is_identifier(expr)
        || expanding.len() >= MAX_EXPANSION_DEPTH
        || expanding.iter().any(|name| name == expr)
    {
        return false;
    }
    let values = macros.values(expr);
    if values.is_empty() {
        return false;
    }

    expanding.push(expr.to_string());
    let mut complete = true;
    for value in values {
        match parse_include_expr(value) {
            Some((IncludeKind::Macro, token)) => {
                complete &= expand(&token, macros, expanding, out);
            }
            Some(literal) => {
                if !out.contains(&literal) {
                    out.push(literal);
                }
            }
            None => complete = false,
        }
    }
    expanding.pop();
    complete
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
