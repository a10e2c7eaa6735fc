//! Include directives and macro definitions extracted from C-family sources.
//!
//! The source parser produces an [`IncludeDirectives`] value per file; the
//! include resolver consumes it together with a [`MacroTable`] describing every
//! macro value visible at the point of resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lexical form of an include directive's target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IncludeKind {
    /// `#include "path"`: searched relative to the including file first.
    Quoted,
    /// `#include <path>`: searched in the configured search roots only.
    System,
    /// `#include TOKEN`: a preprocessor expression expanded against macros.
    Macro,
}

/// A single `#include` or `#import` directive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Include {
    /// How the target was written.
    pub kind: IncludeKind,
    /// The literal path for quoted and system includes, or the raw token
    /// expression for macro includes.
    pub value: String,
    /// `true` for `#import`, `false` for `#include`.
    pub is_import: bool,
    /// 1-based line of the directive, for diagnostics only.
    pub line: Option<u32>,
}

impl Include {
    /// Creates an `#include` directive without position information.
    pub fn new(kind: IncludeKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            is_import: false,
            line: None,
        }
    }

    /// Returns `true` if the target is a macro expression rather than a path.
    pub fn is_macro(&self) -> bool {
        self.kind == IncludeKind::Macro
    }
}

/// An object-like `#define NAME value` directive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroDef {
    /// The macro name.
    pub name: String,
    /// The replacement text, trimmed. May be empty.
    pub value: String,
}

impl MacroDef {
    /// Creates a macro definition.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Every directive of interest found in one file, in source order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeDirectives {
    /// Include and import directives.
    pub includes: Vec<Include>,
    /// Object-like macro definitions.
    pub macros: Vec<MacroDef>,
}

impl IncludeDirectives {
    /// Returns a copy without any `#import` directives.
    pub fn discard_imports(&self) -> Self {
        Self {
            includes: self.includes.iter().filter(|i| !i.is_import).cloned().collect(),
            macros: self.macros.clone(),
        }
    }

    /// Returns `true` if any include target is a macro expression.
    pub fn has_macro_includes(&self) -> bool {
        self.includes.iter().any(Include::is_macro)
    }

    /// Returns `true` if the file contributes neither includes nor macros.
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.macros.is_empty()
    }
}

/// Macro name to the distinct values it may take.
///
/// A macro defined in several files (or in several branches of a conditional)
/// keeps every value in first-seen order; include resolution fans out over all
/// of them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MacroTable {
    values: BTreeMap<String, Vec<String>>,
}

impl MacroTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from configured `name -> value` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut table = Self::new();
        for (name, value) in pairs {
            table.define(name, value);
        }
        table
    }

    /// Records a value for `name`. Returns `true` if the value was new.
    pub fn define(&mut self, name: &str, value: &str) -> bool {
        let values = self.values.entry(name.to_string()).or_default();
        if values.iter().any(|v| v == value) {
            return false;
        }
        values.push(value.to_string());
        true
    }

    /// Records every macro of `directives`. Returns `true` if anything was new.
    pub fn extend_from(&mut self, directives: &IncludeDirectives) -> bool {
        let mut changed = false;
        for def in &directives.macros {
            changed |= self.define(&def.name, &def.value);
        }
        changed
    }

    /// Returns the known values of `name`, empty if it was never defined.
    pub fn values(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of (name, value) pairs.
    pub fn len(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }

    /// Returns `true` if no macro is defined.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_imports_keeps_includes_and_macros() {
        let mut import = Include::new(IncludeKind::Quoted, "Foundation.h");
        import.is_import = true;
        let directives = IncludeDirectives {
            includes: vec![Include::new(IncludeKind::Quoted, "a.h"), import],
            macros: vec![MacroDef::new("X", "1")],
        };
        let filtered = directives.discard_imports();
        assert_eq!(filtered.includes.len(), 1);
        assert_eq!(filtered.includes[0].value, "a.h");
        assert_eq!(filtered.macros.len(), 1);
    }

    #[test]
    fn has_macro_includes() {
        let mut directives = IncludeDirectives::default();
        assert!(!directives.has_macro_includes());
        directives.includes.push(Include::new(IncludeKind::Macro, "HEADER"));
        assert!(directives.has_macro_includes());
    }

    #[test]
    fn macro_table_dedups_values() {
        let mut table = MacroTable::new();
        assert!(table.define("HEADER", "\"a.h\""));
        assert!(!table.define("HEADER", "\"a.h\""));
        assert!(table.define("HEADER", "\"b.h\""));
        assert_eq!(table.values("HEADER"), ["\"a.h\"", "\"b.h\""]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn macro_table_unknown_is_empty() {
        let table = MacroTable::new();
        assert!(table.values("NOPE").is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn macro_table_from_pairs() {
        let mut configured = BTreeMap::new();
        configured.insert("A".to_string(), "<a.h>".to_string());
        let table = MacroTable::from_pairs(&configured);
        assert_eq!(table.values("A"), ["<a.h>"]);
    }
}
