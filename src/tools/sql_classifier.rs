//! Read/write classification and row-bound injection.
//!
//! Classification is keyword based: leading comments are stripped, the text
//! is upper-cased and the first word decides. It is pure and total; it never
//! fails, and when it is wrong the dispatcher's read-only gate (plus the
//! optional strict validator) is the backstop.

/// Statement introducers that modify data or schema.
pub const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "UPSERT",
    "MERGE", "GRANT", "REVOKE", "VACUUM",
];

/// Write introducers that can generate a row id.
const INSERT_KEYWORDS: &[&str] = &["INSERT", "REPLACE", "UPSERT"];

/// Introducers that return rows but take no row bound.
const ROW_RETURNING_KEYWORDS: &[&str] = &["SHOW", "DESCRIBE", "DESC", "EXPLAIN", "VALUES"];

/// Words that may sit between `EXPLAIN` and the explained statement.
const EXPLAIN_OPTIONS: &[&str] = &[
    "ANALYZE", "ANALYSE", "VERBOSE", "QUERY", "PLAN", "EXTENDED", "PARTITIONS", "FORMAT",
];

/// What a statement does, derived once from its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryIntent {
    pub raw_sql: String,
    pub is_write: bool,
    pub is_select_like: bool,
    pub has_explicit_limit: bool,
    /// Select-like, or another row-returning introducer such as SHOW
    pub returns_rows: bool,
    is_pragma: bool,
    is_insert: bool,
}

impl QueryIntent {
    /// Classify a statement.
    pub fn classify(sql: &str) -> Self {
        let upper = strip_leading_comments(sql).to_ascii_uppercase();

        let is_cte = starts_with_word(&upper, "WITH");
        let is_pragma = starts_with_word(&upper, "PRAGMA");
        let is_insert = INSERT_KEYWORDS.iter().any(|kw| starts_with_word(&upper, kw))
            || (is_cte && cte_trailing_keyword_in(&upper, INSERT_KEYWORDS));
        // EXPLAIN ANALYZE runs its statement on PostgreSQL and MySQL
        let is_write = is_write_statement(&upper)
            || explained_statement(&upper).is_some_and(is_write_statement);
        let is_select_like = starts_with_word(&upper, "SELECT")
            || (is_cte && !is_write)
            || (is_pragma && !upper.contains('='));
        let returns_rows = is_select_like
            || ROW_RETURNING_KEYWORDS
                .iter()
                .any(|kw| starts_with_word(&upper, kw));

        Self {
            raw_sql: sql.to_string(),
            is_write,
            is_select_like,
            has_explicit_limit: has_limit_clause(&upper),
            returns_rows,
            is_pragma,
            is_insert,
        }
    }

    /// Whether the statement adds rows, so a generated row id is meaningful.
    pub fn inserts_rows(&self) -> bool {
        self.is_insert
    }

    /// Whether a row bound would be appended for the given limit.
    pub fn wants_limit(&self, limit: u32) -> bool {
        // PRAGMA statements have no LIMIT clause in SQLite's grammar.
        limit > 0 && self.is_select_like && !self.is_pragma && !self.has_explicit_limit
    }

    /// Return the statement with a row bound appended when one applies.
    ///
    /// Statements that already carry a limit, and a limit of zero
    /// (unbounded), are returned unchanged.
    pub fn apply_limit(&self, limit: u32) -> String {
        if !self.wants_limit(limit) {
            return self.raw_sql.clone();
        }
        // Trailing terminators and comments are dropped so the bound lands
        // inside the statement.
        let end = lexemes(&self.raw_sql)
            .iter()
            .rev()
            .find(|(_, lexeme)| *lexeme == Lexeme::Content)
            .map_or(0, |(end, _)| *end);
        format!("{} LIMIT {}", &self.raw_sql[..end], limit)
    }
}

/// Whether statement text follows a `;` terminator.
///
/// Terminators inside quotes or comments, and trailing comments after the
/// last terminator, do not count.
pub fn has_multiple_statements(sql: &str) -> bool {
    lexemes(sql)
        .iter()
        .skip_while(|(_, lexeme)| *lexeme != Lexeme::Terminator)
        .any(|(_, lexeme)| *lexeme == Lexeme::Content)
}

/// Classify and rewrite in one step, returning the SQL to execute.
pub fn rewrite(sql: &str, limit: u32) -> (QueryIntent, String) {
    let intent = QueryIntent::classify(sql);
    let rewritten = intent.apply_limit(limit);
    (intent, rewritten)
}

/// Strip leading whitespace, `--` line comments and `/* */` block comments.
pub fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(i) => &after[i + 1..],
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(i) => &after[i + 2..],
                None => "",
            };
        } else {
            return rest;
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn starts_with_word(upper: &str, word: &str) -> bool {
    upper
        .strip_prefix(word)
        .is_some_and(|rest| !rest.starts_with(is_ident_char))
}

fn is_write_statement(upper: &str) -> bool {
    WRITE_KEYWORDS.iter().any(|kw| starts_with_word(upper, kw))
        || (starts_with_word(upper, "WITH") && cte_trailing_keyword_in(upper, WRITE_KEYWORDS))
}

/// The statement an `EXPLAIN`/`DESCRIBE` wraps, past any options.
fn explained_statement(upper: &str) -> Option<&str> {
    let mut rest = ["EXPLAIN", "DESCRIBE", "DESC"]
        .iter()
        .find(|kw| starts_with_word(upper, kw))
        .map(|kw| &upper[kw.len()..])?;
    loop {
        rest = rest.trim_start();
        if let Some(options) = rest.strip_prefix('(') {
            // EXPLAIN (ANALYZE, FORMAT JSON) ...
            rest = options.find(')').map_or("", |i| &options[i + 1..]);
        } else if let Some(option) = EXPLAIN_OPTIONS.iter().find(|kw| starts_with_word(rest, kw)) {
            rest = &rest[option.len()..];
            // MySQL's FORMAT=TREE takes a value
            if let Some(value) = rest.trim_start().strip_prefix('=') {
                let value = value.trim_start();
                rest = value
                    .find(char::is_whitespace)
                    .map_or("", |i| &value[i..]);
            }
        } else {
            return Some(rest);
        }
    }
}

/// `WITH x AS (...) INSERT ...`: one of `keywords` right after a closing paren.
fn cte_trailing_keyword_in(upper: &str, keywords: &[&str]) -> bool {
    upper.match_indices(')').any(|(i, _)| {
        let after = upper[i + 1..].trim_start();
        keywords.iter().any(|kw| starts_with_word(after, kw))
    })
}

/// `LIMIT <digits>`, `LIMIT ?` or `LIMIT $<n>` anywhere in the statement.
fn has_limit_clause(upper: &str) -> bool {
    upper.match_indices("LIMIT").any(|(i, _)| {
        let boundary_before = upper[..i]
            .chars()
            .next_back()
            .is_none_or(|c| !is_ident_char(c));
        let rest = &upper[i + "LIMIT".len()..];
        let value = rest.trim_start();
        if !boundary_before || value.len() == rest.len() {
            return false;
        }
        let mut chars = value.chars();
        match chars.next() {
            Some('?') => true,
            Some('$') => chars.next().is_some_and(|c| c.is_ascii_digit()),
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Content,
    Terminator,
}

/// Significant characters outside comments, each with the byte offset just
/// past it. A quoted literal or identifier is one lexeme.
fn lexemes(sql: &str) -> Vec<(usize, Lexeme)> {
    let mut out = Vec::new();
    let mut chars = sql.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '-' if chars.peek().is_some_and(|&(_, next)| next == '-') => {
                for (_, next) in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek().is_some_and(|&(_, next)| next == '*') => {
                chars.next();
                let mut prev = ' ';
                for (_, next) in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '\'' | '"' | '`' => {
                let mut end = sql.len();
                for (j, next) in chars.by_ref() {
                    if next == c {
                        end = j + 1;
                        break;
                    }
                }
                out.push((end, Lexeme::Content));
            }
            ';' => out.push((i + 1, Lexeme::Terminator)),
            c if c.is_whitespace() => {}
            c => out.push((i + c.len_utf8(), Lexeme::Content)),
        }
    }
    out
}
