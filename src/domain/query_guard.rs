// Read-only query guard for the ad-hoc SQL surface
use thiserror::Error;

pub const DEFAULT_ROW_LIMIT: u64 = 50;

const ALLOWED_STARTS: [&str; 3] = ["SELECT", "WITH", "EXPLAIN"];

const FORBIDDEN_KEYWORDS: [&str; 14] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "MERGE",
    "CALL", "EXEC", "PRAGMA", "ATTACH", "DETACH",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuerySecurityError {
    #[error("empty query")]
    Empty,
    #[error("only SELECT, WITH and EXPLAIN queries are allowed")]
    NotReadOnly,
    #[error("multiple statements are not allowed")]
    MultipleStatements,
    #[error("forbidden operation detected: {0}")]
    ForbiddenKeyword(&'static str),
}

fn words(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}

/// Validates a user query and bounds its result size.
///
/// Returns the statement to execute: trailing semicolons removed, and a
/// `LIMIT` appended when missing or clamped when above `max_rows`.
pub fn sanitize_query(sql: &str, max_rows: u64) -> Result<String, QuerySecurityError> {
    let query = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if query.is_empty() {
        return Err(QuerySecurityError::Empty);
    }

    let upper = query.to_ascii_uppercase();
    if !ALLOWED_STARTS.iter().any(|start| upper.starts_with(start)) {
        return Err(QuerySecurityError::NotReadOnly);
    }
    if query.contains(';') {
        return Err(QuerySecurityError::MultipleStatements);
    }
    for word in words(&upper) {
        if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().find(|k| **k == word) {
            return Err(QuerySecurityError::ForbiddenKeyword(*keyword));
        }
    }

    Ok(apply_row_limit(query, &upper, max_rows))
}

fn apply_row_limit(query: &str, upper: &str, max_rows: u64) -> String {
    let tokens: Vec<&str> = words(upper).collect();
    let limit = tokens
        .iter()
        .position(|w| *w == "LIMIT")
        .map(|idx| tokens.get(idx + 1).and_then(|n| n.parse::<u64>().ok()));

    match limit {
        None => {
            tracing::debug!("Appending LIMIT {} to query", max_rows);
            format!("{} LIMIT {}", query, max_rows)
        }
        Some(Some(n)) if n > max_rows => {
            tracing::debug!("Clamping LIMIT {} to {}", n, max_rows);
            clamp_limit(query, upper, max_rows)
        }
        Some(_) => query.to_string(),
    }
}

fn is_word_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Byte offset of `keyword` as a whole word in `upper`
fn find_keyword(upper: &str, keyword: &str) -> Option<usize> {
    let bytes = upper.as_bytes();
    upper.match_indices(keyword).map(|(idx, _)| idx).find(|&idx| {
        let end = idx + keyword.len();
        let before_ok = idx == 0 || !is_word_char(bytes[idx - 1]);
        let after_ok = end == bytes.len() || !is_word_char(bytes[end]);
        before_ok && after_ok
    })
}

/// Rewrites the number of the first `LIMIT <n>` clause, preserving the rest
fn clamp_limit(query: &str, upper: &str, max_rows: u64) -> String {
    let Some(start) = find_keyword(upper, "LIMIT") else {
        return query.to_string();
    };
    let after_keyword = start + "LIMIT".len();
    let rest = &upper[after_keyword..];
    let digits_start = after_keyword + (rest.len() - rest.trim_start().len());
    let digits_len = upper[digits_start..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    format!(
        "{}{}{}",
        &query[..digits_start],
        max_rows,
        &query[digits_start + digits_len..]
    )
}
