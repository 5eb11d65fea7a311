//! Identifier utilities
//!
//! Quoting, case folding and reserved words differ per backend. These helpers
//! keep those rules in one place for the inspectors, the schema graph and the
//! fixture executor.

use crate::inspector::Backend;

/// Keywords reserved by every supported backend.
const SQL_KEYWORDS: &[&str] = &[
    "add", "all", "alter", "and", "any", "as", "asc", "between", "by", "case", "check",
    "column", "constraint", "create", "default", "delete", "desc", "distinct", "drop", "else",
    "exists", "foreign", "from", "group", "having", "in", "index", "insert", "into", "is",
    "join", "key", "like", "not", "null", "on", "or", "order", "primary", "references",
    "select", "set", "table", "then", "union", "unique", "update", "values", "when", "where",
];

/// Words Oracle refuses as unquoted identifiers on top of [`SQL_KEYWORDS`].
const ORACLE_KEYWORDS: &[&str] = &[
    "access", "audit", "char", "cluster", "comment", "compress", "connect", "current", "date",
    "decimal", "file", "float", "grant", "identified", "immediate", "increment", "initial",
    "integer", "level", "lock", "long", "maxextents", "minus", "mode", "modify", "noaudit",
    "nocompress", "nowait", "number", "of", "offline", "online", "option", "pctfree", "prior",
    "privileges", "public", "raw", "rename", "resource", "revoke", "row", "rowid", "rownum",
    "rows", "session", "share", "size", "smallint", "start", "successful", "synonym", "sysdate",
    "to", "trigger", "uid", "user", "validate", "varchar", "varchar2", "view", "whenever",
    "with",
];

/// Check if `name` is reserved on `backend`.
pub fn is_reserved_word(name: &str, backend: Backend) -> bool {
    let lower = name.to_ascii_lowercase();
    SQL_KEYWORDS.contains(&lower.as_str())
        || (backend == Backend::Oracle && ORACLE_KEYWORDS.contains(&lower.as_str()))
}

/// The character the backend quotes identifiers with.
pub fn quote_char(backend: Backend) -> char {
    match backend {
        Backend::MySql => '`',
        Backend::Sqlite | Backend::Postgres | Backend::Oracle => '"',
    }
}

/// Quote an identifier for `backend`, doubling embedded quote characters.
pub fn quote_identifier(name: &str, backend: Backend) -> String {
    let quote = quote_char(backend);
    let escaped = name.replace(quote, &format!("{quote}{quote}"));
    format!("{quote}{escaped}{quote}")
}

/// Quote `name` only when it could not be written bare.
pub fn escape_identifier(name: &str, backend: Backend) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain && !is_reserved_word(name, backend) {
        name.to_string()
    } else {
        quote_identifier(name, backend)
    }
}

/// Strip one level of identifier quotes (`"x"`, `` `x` `` or `[x]`).
pub fn unquote(name: &str) -> Option<&str> {
    let mut chars = name.chars();
    let first = chars.next()?;
    let last = chars.next_back()?;
    match (first, last) {
        ('"', '"') | ('`', '`') | ('[', ']') => Some(&name[1..name.len() - 1]),
        _ => None,
    }
}

/// The name under which `backend` stores an identifier written as `name`.
///
/// Quoted names keep their case. Unquoted names are folded the way the
/// backend folds them: lower for PostgreSQL, upper for Oracle. SQLite
/// compares case-insensitively, and fathom reports its names lower-cased.
pub fn normalize_identifier(name: &str, backend: Backend) -> String {
    let quoted = unquote(name);
    match (backend, quoted) {
        (Backend::Sqlite, quoted) => quoted.unwrap_or(name).to_lowercase(),
        (Backend::MySql, quoted) => quoted.unwrap_or(name).to_string(),
        (_, Some(exact)) => exact.to_string(),
        (Backend::Postgres, None) => name.to_lowercase(),
        (Backend::Oracle, None) => name.to_uppercase(),
    }
}

/// Replace the `from` quote character with `to` outside of string literals.
pub fn substitute_quote_char(sql: &str, from: char, to: char) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut in_literal = false;
    for c in sql.chars() {
        if c == '\'' {
            in_literal = !in_literal;
            result.push(c);
        } else if c == from && !in_literal {
            result.push(to);
        } else {
            result.push(c);
        }
    }
    result
}

/// Rewrite double-quoted identifiers for backends that quote differently.
pub fn adapt_quotes(sql: &str, backend: Backend) -> String {
    match quote_char(backend) {
        '"' => sql.to_string(),
        quote => substitute_quote_char(sql, '"', quote),
    }
}
