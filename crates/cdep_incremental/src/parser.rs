//! Directive extraction from C-family source text.
//!
//! The parser is a line scanner, not a preprocessor. It understands just
//! enough of the language to find `#include`, `#import` and object-like
//! `#define` lines: backslash line splicing, both comment styles, and string
//! and character literals (so that comment markers inside them are left
//! alone). Conditional compilation is ignored, so every branch contributes.

use std::sync::{Arc, LazyLock};

use cdep_common::{Include, IncludeDirectives, IncludeKind, MacroDef};
use regex::Regex;

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#\s*(include|import|define)\b(.*)$").expect("directive pattern is valid")
});

static DEFINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)(\(?)(.*)$").expect("define pattern is valid")
});

/// Extracts include directives and macro definitions from source text.
///
/// Implementations must be pure functions of the text: the same input always
/// yields the same directives, and malformed directives are skipped rather
/// than reported.
pub trait CSourceParser: Send + Sync {
    /// Parses `text` into its directives, in source order.
    fn parse_source(&self, text: &str) -> IncludeDirectives;
}

/// The default [`CSourceParser`], built on two regular expressions applied
/// to comment-free logical lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegexCSourceParser;

impl RegexCSourceParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self
    }
}

impl CSourceParser for RegexCSourceParser {
    fn parse_source(&self, text: &str) -> IncludeDirectives {
        let mut directives = IncludeDirectives::default();
        let mut in_block_comment = false;

        for (line_no, line) in logical_lines(text) {
            let line = strip_comments(&line, &mut in_block_comment);
            if !line.contains('#') {
                continue;
            }
            let Some(caps) = DIRECTIVE.captures(&line) else {
                continue;
            };
            let body = caps.get(2).map_or("", |m| m.as_str());
            match &caps[1] {
                "define" => {
                    if let Some(def) = parse_define(body) {
                        directives.macros.push(def);
                    }
                }
                keyword => {
                    if let Some((kind, value)) = parse_include_expr(body) {
                        directives.includes.push(Include {
                            kind,
                            value,
                            is_import: keyword == "import",
                            line: Some(line_no),
                        });
                    }
                }
            }
        }
        directives
    }
}

/// Classifies the text after `#include`/`#import`, or a macro value being
/// expanded as an include target.
///
/// Returns `None` for empty or unterminated forms. Anything that is not a
/// quoted or bracketed path is returned as a trimmed macro expression.
pub fn parse_include_expr(text: &str) -> Option<(IncludeKind, String)> {
    let text = text.trim();
    let mut chars = text.chars();
    match chars.next()? {
        '"' => {
            let rest = &text[1..];
            let end = rest.find('"')?;
            let path = &rest[..end];
            (!path.is_empty()).then(|| (IncludeKind::Quoted, path.to_string()))
        }
        '<' => {
            let rest = &text[1..];
            let end = rest.find('>')?;
            let path = &rest[..end];
            (!path.is_empty()).then(|| (IncludeKind::System, path.to_string()))
        }
        _ => Some((IncludeKind::Macro, text.to_string())),
    }
}

/// Parses the body of a `#define`. Function-like macros are skipped.
fn parse_define(body: &str) -> Option<MacroDef> {
    // `#define` must be followed by whitespace before the name.
    if !body.starts_with(char::is_whitespace) {
        return None;
    }
    let caps = DEFINE.captures(body)?;
    if !caps[2].is_empty() {
        return None;
    }
    let rest = &caps[3];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(MacroDef::new(&caps[1], rest.trim()))
}

/// Splices backslash-continued lines. Each logical line carries the 1-based
/// number of the physical line it starts on.
fn logical_lines(text: &str) -> Vec<(u32, String)> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut start = None;

    for (idx, raw) in text.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let line_no = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        start.get_or_insert(line_no);
        match raw.strip_suffix('\\') {
            Some(head) => current.push_str(head),
            None => {
                current.push_str(raw);
                lines.push((start.take().unwrap_or(line_no), std::mem::take(&mut current)));
            }
        }
    }
    if let Some(line_no) = start {
        lines.push((line_no, current));
    }
    lines
}

/// Removes comments from one logical line. Block comments may span lines;
/// `in_block` carries that state between calls. A comment is replaced by a
/// single space.
fn strip_comments(line: &str, in_block: &mut bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut quote: Option<char> = None;
    // Inside an identifier or number token, and whether that token is a number.
    let mut word = false;
    let mut number = false;

    while let Some(c) = chars.next() {
        if *in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                *in_block = false;
                out.push(' ');
            }
            continue;
        }
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                *in_block = true;
                word = false;
            }
            '/' if chars.peek() == Some(&'/') => break,
            // Digit separator, as in `1'000`.
            '\'' if number && chars.peek().is_some_and(char::is_ascii_alphanumeric) => {
                out.push(c);
            }
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
                word = false;
            }
            _ => {
                let continues = word && (c.is_ascii_alphanumeric() || c == '_' || c == '.');
                number = if continues { number } else { c.is_ascii_digit() };
                word = continues || c.is_ascii_alphanumeric() || c == '_';
                out.push(c);
            }
        }
    }
    out
}

/// Parses source text and applies the task's import handling.
///
/// When imports are not treated as includes, `#import` directives are
/// dropped before resolution.
#[derive(Clone)]
pub struct SourceIncludesParser {
    parser: Arc<dyn CSourceParser>,
    imports_are_includes: bool,
}

impl SourceIncludesParser {
    /// Wraps `parser`.
    pub fn new(parser: Arc<dyn CSourceParser>, imports_are_includes: bool) -> Self {
        Self {
            parser,
            imports_are_includes,
        }
    }

    /// Whether `#import` directives take part in resolution.
    pub fn imports_are_includes(&self) -> bool {
        self.imports_are_includes
    }

    /// Parses `text` into the directives that take part in resolution.
    pub fn parse_includes(&self, text: &str) -> IncludeDirectives {
        let directives = self.parser.parse_source(text);
        if self.imports_are_includes {
            directives
        } else {
            directives.discard_imports()
        }
    }
}

impl std::fmt::Debug for SourceIncludesParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceIncludesParser")
            .field("imports_are_includes", &self.imports_are_includes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> IncludeDirectives {
        RegexCSourceParser::new().parse_source(text)
    }

    fn values(d: &IncludeDirectives) -> Vec<(IncludeKind, &str)> {
        d.includes.iter().map(|i| (i.kind, i.value.as_str())).collect()
    }

    #[test]
    fn quoted_and_system_includes() {
        let d = parse("#include \"a.h\"\n#include <stdio.h>\n");
        assert_eq!(
            values(&d),
            vec![(IncludeKind::Quoted, "a.h"), (IncludeKind::System, "stdio.h")]
        );
        assert_eq!(d.includes[0].line, Some(1));
        assert_eq!(d.includes[1].line, Some(2));
    }

    #[test]
    fn whitespace_around_hash() {
        let d = parse("  #  include   \"sub/b.h\"\n\t#include<c.h>\n");
        assert_eq!(
            values(&d),
            vec![(IncludeKind::Quoted, "sub/b.h"), (IncludeKind::System, "c.h")]
        );
    }

    #[test]
    fn macro_include() {
        let d = parse("#define HEADER \"x.h\"\n#include HEADER\n");
        assert_eq!(values(&d), vec![(IncludeKind::Macro, "HEADER")]);
        assert_eq!(d.macros, vec![MacroDef::new("HEADER", "\"x.h\"")]);
    }

    #[test]
    fn imports_are_flagged() {
        let d = parse("#import <Foundation/Foundation.h>\n#include \"a.h\"\n");
        assert!(d.includes[0].is_import);
        assert!(!d.includes[1].is_import);
    }

    #[test]
    fn line_comments_hide_directives() {
        let d = parse("// #include \"a.h\"\n#include \"b.h\" // trailing\n");
        assert_eq!(values(&d), vec![(IncludeKind::Quoted, "b.h")]);
    }

    #[test]
    fn block_comments_span_lines() {
        let d = parse("/* start\n#include \"hidden.h\"\nend */ #include \"seen.h\"\n");
        assert_eq!(values(&d), vec![(IncludeKind::Quoted, "seen.h")]);
    }

    #[test]
    fn digit_separators_do_not_open_char_literals() {
        let d = parse("int x = 1'000; /* disabled\n#include \"gone.h\"\n*/\n#include \"kept.h\"\n");
        assert_eq!(values(&d), vec![(IncludeKind::Quoted, "kept.h")]);

        let d = parse("long m = 0xFF'FF'FF; /*\n#include HIDDEN\n*/\n");
        assert!(d.includes.is_empty());
    }

    #[test]
    fn char_literals_still_hide_comment_markers() {
        let d = parse("char c = u8'/'; char d = '*'; /* #include HIDDEN\n*/ #include <seen.h>\n");
        assert_eq!(values(&d), vec![(IncludeKind::System, "seen.h")]);
    }

    #[test]
    fn inline_block_comment_between_tokens() {
        let d = parse("#include /* why */ \"a.h\"\n");
        assert_eq!(values(&d), vec![(IncludeKind::Quoted, "a.h")]);
    }

    #[test]
    fn comment_markers_inside_strings_are_kept() {
        let d = parse("#define URL \"http://example.com\"\n");
        assert_eq!(d.macros, vec![MacroDef::new("URL", "\"http://example.com\"")]);
    }

    #[test]
    fn backslash_continuation() {
        let d = parse("#include \\\n  \"a.h\"\n#include \"b.h\"\n");
        assert_eq!(
            values(&d),
            vec![(IncludeKind::Quoted, "a.h"), (IncludeKind::Quoted, "b.h")]
        );
        assert_eq!(d.includes[0].line, Some(1));
        assert_eq!(d.includes[1].line, Some(3));
    }

    #[test]
    fn crlf_line_endings() {
        let d = parse("#include \"a.h\"\r\n#define X 1\r\n");
        assert_eq!(values(&d), vec![(IncludeKind::Quoted, "a.h")]);
        assert_eq!(d.macros, vec![MacroDef::new("X", "1")]);
    }

    #[test]
    fn malformed_directives_are_skipped() {
        let d = parse("#include\n#include \"unterminated\n#include <also\n#include \"\"\n");
        assert!(d.includes.is_empty());
    }

    #[test]
    fn function_like_defines_are_skipped() {
        let d = parse("#define MAX(a, b) ((a) > (b) ? (a) : (b))\n#define EMPTY\n#define N 4\n");
        assert_eq!(
            d.macros,
            vec![MacroDef::new("EMPTY", ""), MacroDef::new("N", "4")]
        );
    }

    #[test]
    fn define_requires_separator() {
        let d = parse("#defineX 1\n#define_Y 2\n");
        assert!(d.macros.is_empty());
    }

    #[test]
    fn conditional_branches_all_contribute() {
        let text = "#ifdef WIN\n#define HDR \"win.h\"\n#else\n#define HDR \"posix.h\"\n#endif\n";
        let d = parse(text);
        assert_eq!(
            d.macros,
            vec![MacroDef::new("HDR", "\"win.h\""), MacroDef::new("HDR", "\"posix.h\"")]
        );
    }

    #[test]
    fn non_directive_lines_are_ignored() {
        let d = parse("int include = 1;\nconst char *s = \"#include \\\"x.h\\\"\";\n");
        assert!(d.is_empty());
    }

    #[test]
    fn include_expr_classification() {
        assert_eq!(
            parse_include_expr(" \"a.h\" "),
            Some((IncludeKind::Quoted, "a.h".to_string()))
        );
        assert_eq!(
            parse_include_expr("<a.h>"),
            Some((IncludeKind::System, "a.h".to_string()))
        );
        assert_eq!(
            parse_include_expr("CONFIG_HEADER"),
            Some((IncludeKind::Macro, "CONFIG_HEADER".to_string()))
        );
        assert_eq!(parse_include_expr("   "), None);
    }

    #[test]
    fn source_includes_parser_discards_imports() {
        let text = "#import \"a.h\"\n#include \"b.h\"\n";
        let keep = SourceIncludesParser::new(Arc::new(RegexCSourceParser::new()), true);
        let drop = SourceIncludesParser::new(Arc::new(RegexCSourceParser::new()), false);
        assert_eq!(keep.parse_includes(text).includes.len(), 2);
        let dropped = drop.parse_includes(text);
        assert_eq!(dropped.includes.len(), 1);
        assert_eq!(dropped.includes[0].value, "b.h");
    }

    #[test]
    fn parsing_is_deterministic() {
        let text = "#include \"a.h\"\n#define A \"b.h\"\n#include A\n";
        assert_eq!(parse(text), parse(text));
    }
}
