//! Static import discovery for Python sources.
//!
//! The scanner does not parse Python; it splits a source file into logical
//! statements (joining bracketed and backslash-continued lines, dropping
//! comments, keeping string literals intact) and recognises the statement
//! forms that can bring a module into the program:
//!
//! - `import a.b, c as d`
//! - `from a.b import c, d` and `from . import x` / `from ..p import (q, r)`
//! - `importlib.import_module("x")` and `__import__("x")` with a literal name
//!
//! Imports nested in `if`, `try` or function bodies are found like any other,
//! since indentation is not significant to the scan.

use std::ops::Range;

/// An import statement found in a module's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStmt {
    /// `import a.b.c`, one per imported dotted name.
    Import { module: String },

    /// `from <dots><module> import <names>`.
    From {
        /// Number of leading dots (0 for absolute imports).
        level: usize,
        /// Module after the dots, if any (`from . import x` has none).
        module: Option<String>,
        /// Imported names; `*` for star imports.
        names: Vec<String>,
    },
}

/// Keywords that introduce a compound statement whose body may follow the
/// colon on the same line (`try: import x`).
const COMPOUND_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "try", "except", "finally", "with", "for", "while", "def", "class",
];

/// Call targets whose first literal argument names a module.
const DYNAMIC_IMPORTERS: &[&str] = &["import_module(", "__import__("];

/// Scan a Python source for import statements, in source order.
pub fn scan_imports(source: &str) -> Vec<ImportStmt> {
    let mut imports = Vec::new();
    for statement in logical_statements(source) {
        parse_statement(&statement, &mut imports);
    }
    imports
}

/// One logical statement and the byte ranges of its string literals.
#[derive(Debug, Default)]
struct Statement {
    text: String,
    literals: Vec<Range<usize>>,
}

impl Statement {
    fn in_literal(&self, pos: usize) -> bool {
        self.literals.iter().any(|span| span.contains(&pos))
    }
}

/// Split source text into logical statements.
fn logical_statements(source: &str) -> Vec<Statement> {
    let chars: Vec<char> = source.chars().collect();
    let mut statements = Vec::new();
    let mut current = Statement::default();
    let mut depth = 0usize;
    let mut i = 0;

    let mut finish = |current: &mut Statement| {
        let statement = std::mem::take(current);
        let trimmed = statement.text.trim_end();
        let leading = trimmed.len() - trimmed.trim_start().len();
        if trimmed.len() > leading {
            statements.push(Statement {
                text: trimmed[leading..].to_string(),
                literals: statement
                    .literals
                    .into_iter()
                    .map(|span| span.start - leading..span.end - leading)
                    .collect(),
            });
        }
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '\'' | '"' => {
                let start = current.text.len();
                i = copy_string_literal(&chars, i, &mut current.text);
                current.literals.push(start..current.text.len());
                continue;
            }
            '\\' if matches!(chars.get(i + 1), Some(&'\n')) => {
                current.text.push(' ');
                i += 2;
                continue;
            }
            '\\' if matches!(chars.get(i + 1), Some(&'\r')) && matches!(chars.get(i + 2), Some(&'\n')) => {
                current.text.push(' ');
                i += 3;
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '\n' if depth > 0 => {
                current.text.push(' ');
                i += 1;
                continue;
            }
            '\n' | ';' if depth == 0 => {
                finish(&mut current);
                i += 1;
                continue;
            }
            _ => {}
        }
        current.text.push(c);
        i += 1;
    }
    finish(&mut current);

    statements
}

/// Copy a string literal starting at `start` into `out`; returns the index
/// just past its closing quote. Newlines inside triple-quoted strings are
/// flattened to spaces so the literal stays on its statement.
fn copy_string_literal(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let quote_len = if triple { 3 } else { 1 };

    for _ in 0..quote_len {
        out.push(quote);
    }
    let mut i = start + quote_len;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            out.push(c);
            if let Some(&next) = chars.get(i + 1) {
                out.push(if next == '\n' { ' ' } else { next });
            }
            i += 2;
            continue;
        }
        if c == quote {
            if !triple {
                out.push(c);
                return i + 1;
            }
            if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                out.push_str(&quote.to_string().repeat(3));
                return i + 3;
            }
        }
        if c == '\n' {
            if !triple {
                // Unterminated single-quoted string; let the line end normally.
                return i;
            }
            out.push(' ');
        } else {
            out.push(c);
        }
        i += 1;
    }

    i
}

fn parse_statement(statement: &Statement, imports: &mut Vec<ImportStmt>) {
    let text = strip_compound_header(&statement.text);

    if let Some(rest) = strip_keyword(text, "import") {
        for part in rest.split(',') {
            let module = strip_alias(part);
            if is_dotted_name(module) {
                imports.push(ImportStmt::Import {
                    module: module.to_string(),
                });
            }
        }
    } else if let Some(rest) = strip_keyword(text, "from") {
        if let Some(stmt) = parse_from(rest) {
            imports.push(stmt);
        }
    }

    for importer in DYNAMIC_IMPORTERS {
        for (pos, _) in statement.text.match_indices(importer) {
            if statement.in_literal(pos) {
                continue;
            }
            let after = &statement.text[pos + importer.len()..];
            if let Some(module) = leading_string_literal(after)
                && is_dotted_name(module)
            {
                imports.push(ImportStmt::Import {
                    module: module.to_string(),
                });
            }
        }
    }
}

/// `try: import x` → `import x`. Statements not starting with a compound
/// keyword are returned unchanged.
fn strip_compound_header(statement: &str) -> &str {
    let starts_compound = COMPOUND_KEYWORDS
        .iter()
        .any(|kw| strip_keyword(statement, kw).is_some() || statement.starts_with(&format!("{kw}:")));
    if !starts_compound {
        return statement;
    }

    for (pos, _) in statement.match_indices(':') {
        let body = statement[pos + 1..].trim_start();
        if strip_keyword(body, "import").is_some() || strip_keyword(body, "from").is_some() {
            return body;
        }
    }
    statement
}

/// Parse the part of a `from` statement after the `from` keyword.
fn parse_from(rest: &str) -> Option<ImportStmt> {
    let rest = rest.trim_start();
    let level = rest.chars().take_while(|&c| c == '.').count();
    let rest = &rest[level..];

    let module_end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(rest.len());
    let module = &rest[..module_end];
    let names = strip_keyword(rest[module_end..].trim_start(), "import")?;

    let module = if module.is_empty() {
        None
    } else if is_dotted_name(module) {
        Some(module.to_string())
    } else {
        return None;
    };
    if level == 0 && module.is_none() {
        return None;
    }

    let names = names
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(strip_alias)
        .filter(|name| *name == "*" || is_identifier(name))
        .map(str::to_string)
        .collect();

    Some(ImportStmt::From {
        level,
        module,
        names,
    })
}

/// Strip a leading keyword followed by whitespace (or a dot or paren, for
/// `from .x import (a)` and `from.x import a`).
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(keyword)?;
    match rest.chars().next() {
        Some(c) if c.is_whitespace() || c == '.' || c == '(' => Some(rest),
        _ => None,
    }
}

/// `a.b as c` → `a.b`.
fn strip_alias(part: &str) -> &str {
    let part = part.trim();
    match part.split_once(char::is_whitespace) {
        Some((name, _)) => name,
        None => part,
    }
}

/// Read a string literal at the start of `text` (after optional whitespace).
fn leading_string_literal(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let quote = text.chars().next().filter(|&c| c == '"' || c == '\'')?;
    let body = &text[1..];
    let end = body.find(quote)?;
    Some(&body[..end])
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn is_dotted_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_identifier)
}
