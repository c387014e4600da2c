//! Injection-safe validation of SQL fragments.
//!
//! Fragments that end up spliced into SQL text (table names, aliases, join
//! columns, select expressions) are checked in two ordered passes:
//!
//! 1. a security scan for reserved keywords (whole word, case-insensitive)
//!    and comment/terminator literals, and
//! 2. a structural whitelist of identifier shapes.
//!
//! The security scan always runs first so that an injection attempt is
//! reported as such even when it is also structurally malformed.
//!
//! The compiled patterns are process-wide constants built once on first use.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result, ValidationErrorKind};

/// Keywords rejected anywhere in a fragment as a whole word.
pub const RESERVED_KEYWORDS: [&str; 10] = [
    "union", "select", "insert", "update", "delete", "drop", "create", "alter", "exec", "execute",
];

/// Substrings rejected anywhere in a fragment.
pub const RESERVED_LITERALS: [&str; 4] = ["--", "/*", "*/", ";"];

/// `identifier[.identifier]{0,2}[->>'key']?[ AS alias]?`
const COLUMN_PATTERN: &str = r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_*][a-zA-Z0-9_]*){0,2}(->>?'[a-zA-Z0-9_]+')?(\s+[Aa][Ss]\s+[a-zA-Z_][a-zA-Z0-9_]*)?$";

/// Column pattern plus a single aliased function call `func(args) AS alias`.
const SELECT_COLUMN_PATTERN: &str = r"^([a-zA-Z_][a-zA-Z0-9_]*\([^)]+\)\s+[Aa][Ss]\s+[a-zA-Z_][a-zA-Z0-9_]*|[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_*][a-zA-Z0-9_]*){0,2}(->>?'[a-zA-Z0-9_]+')?)(\s+[Aa][Ss]\s+[a-zA-Z_][a-zA-Z0-9_]*)?$";

/// Explicit ` AS ` aliasing clause, any case.
const ALIAS_CLAUSE_PATTERN: &str = r"(?i)\s+as\s+";

struct Patterns {
    keywords: Vec<(&'static str, Regex)>,
    column: Regex,
    select_column: Regex,
    alias_clause: Regex,
}

impl Patterns {
    fn compile() -> Self {
        // The patterns are literals; failing to compile one is a programming error
        // caught by the tests below.
        let build = |p: &str| Regex::new(p).unwrap_or_else(|e| panic!("invalid pattern {p:?}: {e}"));
        Self {
            keywords: RESERVED_KEYWORDS
                .iter()
                .map(|kw| (*kw, build(&format!(r"(?i)\b{kw}\b"))))
                .collect(),
            column: build(COLUMN_PATTERN),
            select_column: build(SELECT_COLUMN_PATTERN),
            alias_clause: build(ALIAS_CLAUSE_PATTERN),
        }
    }
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(Patterns::compile)
}

/// Security pass: reject reserved keywords and literals.
///
/// Keywords only match as whole words, so `created_at` or `updated_by` pass.
pub fn check_dangerous_sql(fragment: &str) -> Result<()> {
    if let Some(lit) = RESERVED_LITERALS.iter().find(|lit| fragment.contains(**lit)) {
        tracing::warn!(target: "sqlrel::validate", fragment, literal = *lit, "rejected SQL fragment");
        return Err(Error::validation(
            ValidationErrorKind::Security,
            fragment,
            format!("contains dangerous SQL literal {lit:?}"),
        ));
    }
    if let Some((kw, _)) = patterns()
        .keywords
        .iter()
        .find(|(_, re)| re.is_match(fragment))
    {
        tracing::warn!(target: "sqlrel::validate", fragment, keyword = %kw, "rejected SQL fragment");
        return Err(Error::validation(
            ValidationErrorKind::Security,
            fragment,
            format!("contains dangerous SQL keyword {:?}", kw.to_uppercase()),
        ));
    }
    Ok(())
}

/// Structural pass for table, alias and join-column specifiers.
pub fn is_valid_column(fragment: &str) -> bool {
    patterns().column.is_match(fragment)
}

/// Structural pass for SELECT-list entries (allows one aliased function call).
pub fn is_valid_select_column(fragment: &str) -> bool {
    patterns().select_column.is_match(fragment)
}

/// Returns `true` if the expression carries its own ` AS alias` clause.
pub fn has_alias_clause(expr: &str) -> bool {
    patterns().alias_clause.is_match(expr)
}

/// Split `expr AS alias` at its last aliasing clause.
pub fn split_alias_clause(expr: &str) -> Option<(&str, &str)> {
    let m = patterns().alias_clause.find_iter(expr).last()?;
    Some((expr[..m.start()].trim(), expr[m.end()..].trim()))
}

/// Both passes for an identifier-like fragment.
///
/// `what` names the fragment in the error message ("table", "left column", ...).
pub fn validate_identifier(fragment: &str, what: &str) -> Result<()> {
    check_dangerous_sql(fragment)?;
    if !is_valid_column(fragment) {
        return Err(Error::validation(
            ValidationErrorKind::Structural,
            fragment,
            format!("invalid {what} specification"),
        ));
    }
    Ok(())
}

/// Both passes for one SELECT-list entry. `*` is always accepted.
pub fn validate_select_column(column: &str) -> Result<()> {
    let column = column.trim();
    if column.is_empty() {
        return Err(Error::validation(
            ValidationErrorKind::Empty,
            column,
            "empty column specification",
        ));
    }
    if column == "*" {
        return Ok(());
    }
    check_dangerous_sql(column)?;
    if !is_valid_select_column(column) {
        return Err(Error::validation(
            ValidationErrorKind::Structural,
            column,
            "invalid column specification (must be 'table.column', 'column AS alias', or similar)",
        ));
    }
    Ok(())
}

/// Validate every SELECT-list entry, stopping at the first failure.
pub fn validate_select_columns<S: AsRef<str>>(columns: &[S]) -> Result<()> {
    columns
        .iter()
        .try_for_each(|c| validate_select_column(c.as_ref()))
}
