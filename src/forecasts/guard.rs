//! Read-only boundary for model-supplied SQL.
//!
//! `run_query` executes free text written by a language model. This check
//! narrows it to a single `SELECT`/`WITH` statement with no data-modifying
//! keywords. It is a coarse filter; the backends additionally execute the
//! statement in a read-only context.

use crate::error::{AssistantError, Result};
use regex::Regex;
use std::sync::LazyLock;

static LEADING_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(select|with)\b").expect("valid regex"));

static FORBIDDEN_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|merge|upsert|drop|alter|create|truncate|grant|revoke|copy|vacuum|reindex|call|do|execute|attach|detach|pragma|set|lock|listen|notify)\b",
    )
    .expect("valid regex")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*""#).expect("valid regex"));

/// Blank out string literals and quoted identifiers so their contents are not scanned.
fn strip_quoted(sql: &str) -> String {
    QUOTED.replace_all(sql, "''").into_owned()
}

/// Reject anything but a single read-only query.
pub fn check_read_only(sql: &str) -> Result<()> {
    let stripped = strip_quoted(sql);
    let statement = stripped.trim().trim_end_matches(';').trim_end();

    if statement.is_empty() {
        return Err(AssistantError::Query("Empty query".to_string()));
    }
    if statement.contains(';') {
        return Err(AssistantError::Query(
            "Only a single statement is allowed".to_string(),
        ));
    }
    if !LEADING_KEYWORD.is_match(statement) {
        return Err(AssistantError::Query(
            "Only SELECT or WITH queries are allowed".to_string(),
        ));
    }
    if let Some(found) = FORBIDDEN_KEYWORD.find(statement) {
        return Err(AssistantError::Query(format!(
            "Query contains a forbidden keyword: {}",
            found.as_str().to_uppercase()
        )));
    }

    Ok(())
}
