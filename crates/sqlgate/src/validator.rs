//! Read-only statement screen.
//!
//! A token-presence filter, not a parser: the SQL text is split into
//! statements on `;` and each statement on whitespace. Write, DDL and session
//! keywords reject the statement wherever they appear. Words that double as
//! common column or function names (`comment`, `set`, `replace`, ...) reject it
//! only when they open a statement. Identifiers, literals and operators pass
//! unexamined.
//!
//! Keywords inside string literals or comments are treated like any other
//! token, so `WHERE body = ' delete '` is rejected.

use crate::error::{DataError, Result};
use tracing::warn;

/// Keywords a read-only statement may contain
const ALLOWED_KEYWORDS: &[&str] = &[
    // projection
    "SELECT", "*", "FROM", "AS",
    // joins
    "JOIN", "INNER", "LEFT", "RIGHT", "OUTER", "FULL", "CROSS", "NATURAL", "ON", "USING",
    // filtering
    "WHERE", "AND", "OR", "NOT", "BETWEEN", "IN", "LIKE", "ILIKE", "IS", "NULL", "EXISTS",
    // grouping and ordering
    "GROUP", "ORDER", "BY", "ASC", "DESC", "HAVING",
    // paging
    "LIMIT", "OFFSET", "FETCH", "FIRST", "NEXT", "ROWS", "ONLY",
    // set operations
    "UNION", "ALL", "INTERSECT", "EXCEPT", "MINUS",
    // expressions and CTEs
    "DISTINCT", "CASE", "WHEN", "THEN", "ELSE", "END", "WITH", "EXPLAIN",
];

/// Reserved words that never appear in a read-only statement
const FORBIDDEN_KEYWORDS: &[&str] = &[
    // data modification
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "INTO",
    // schema changes
    "CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME",
    // privileges
    "GRANT", "REVOKE",
    // procedures and sessions
    "CALL", "EXEC", "EXECUTE", "RESET", "DECLARE", "PREPARE", "DEALLOCATE",
    // transactions and locking
    "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT", "LOCK", "UNLOCK",
    // database housekeeping and file access
    "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "SHUTDOWN", "KILL",
];

/// Statement verbs that are also ordinary column or function names
const LEADING_KEYWORDS: &[&str] = &[
    "SET", "REPLACE", "COMMENT", "USE", "DO", "LOAD", "ANALYZE", "COPY", "CLUSTER", "HANDLER",
];

/// Characters stripped from a token before it is classified
const TOKEN_PUNCTUATION: &[char] = &['(', ')', ','];

/// Reject `sql` if any statement in it carries a forbidden keyword.
///
/// Matching is case-insensitive. Surrounding parentheses and commas are
/// ignored, and `;` always ends a statement, so `(DELETE` and `t;DROP` are
/// both caught. The offending word is reported as written.
pub fn validate(sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(DataError::InvalidQuery("SQL statement is empty".to_string()));
    }

    for statement in sql.split(';') {
        let mut leading = true;
        for token in statement.split_whitespace() {
            let word = token.trim_matches(TOKEN_PUNCTUATION);
            if word.is_empty() {
                continue;
            }
            let keyword = word.to_ascii_uppercase();
            let rejected = !is_allowed(&keyword)
                && (is_forbidden(&keyword) || (leading && is_leading_only(&keyword)));
            leading = false;

            if rejected {
                warn!("Rejected SQL containing forbidden keyword {}", keyword);
                return Err(DataError::security(word));
            }
        }
    }

    Ok(())
}

/// Whether `keyword` (upper-cased) is on the read-only allow-list
pub fn is_allowed(keyword: &str) -> bool {
    ALLOWED_KEYWORDS.contains(&keyword)
}

/// Whether `keyword` (upper-cased) is a write/DDL/session keyword anywhere in a statement
pub fn is_forbidden(keyword: &str) -> bool {
    FORBIDDEN_KEYWORDS.contains(&keyword)
}

/// Whether `keyword` (upper-cased) is rejected only as the first word of a statement
pub fn is_leading_only(keyword: &str) -> bool {
    LEADING_KEYWORDS.contains(&keyword)
}
