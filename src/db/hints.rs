//! Remediation hints for SQLite error messages.
//!
//! SQLite reports most failures as plain text. A handful of them are common
//! enough that a short hint saves the caller a round trip. Matching is
//! case-insensitive and the first matching rule wins.

const HINT_MARKER: &str = "\nHint: ";

/// Ordered (pattern, hint) rules. Earlier entries take precedence.
const SQLITE_HINTS: &[(&[&str], &str)] = &[
    (
        &["attempt to write a readonly database", "readonly database", "read-only"],
        "The database was opened read-only. Set readonly to false and check file permissions.",
    ),
    (
        &[
            "database is locked",
            "database table is locked",
            "database is busy",
            "sqlite_busy",
        ],
        "Another connection holds a lock. Retry shortly or shorten long-running transactions.",
    ),
    (
        &["constraint failed", "constraint violation"],
        "A UNIQUE, NOT NULL, CHECK or FOREIGN KEY constraint rejected the change. Inspect the table schema.",
    ),
    (
        &["no such table"],
        "The table does not exist. Use describe_schema to list available tables.",
    ),
    (
        &["no such column"],
        "The column does not exist. Use describe_schema with the table name to list its columns.",
    ),
    (
        &["malformed", "file is not a database", "corrupt"],
        "The database file appears corrupted. Run PRAGMA integrity_check or restore from a backup.",
    ),
    (
        &["unable to open", "cannot open"],
        "The database file could not be opened. Check that the path exists and is accessible.",
    ),
];

/// Find the hint for a SQLite error message, if any rule matches.
pub fn sqlite_hint(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    SQLITE_HINTS
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(_, hint)| *hint)
}

/// Append a remediation hint to a SQLite error message.
///
/// Unrecognized messages, and messages that already carry a hint, are
/// returned unchanged.
pub fn normalize_sqlite_error(message: &str) -> String {
    if message.contains(HINT_MARKER) {
        return message.to_string();
    }
    match sqlite_hint(message) {
        Some(hint) => format!("{}{}{}", message, HINT_MARKER, hint),
        None => message.to_string(),
    }
}
