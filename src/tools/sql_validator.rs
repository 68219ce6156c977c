//! Strict read-only validation.
//!
//! The keyword classifier is a heuristic. When strict mode is enabled, a
//! read-only statement must additionally parse with
//! [sqlparser](https://docs.rs/sqlparser/) into nothing but queries, plans,
//! SHOW statements or read-only pragmas. This closes gaps such as a
//! `SELECT 1; DELETE FROM t` batch that the prefix check accepts.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Validate that every statement in `sql` is read-only.
///
/// Statements that cannot be parsed are rejected, since their effect
/// cannot be verified.
///
/// ```
/// use sql_gateway::tools::sql_validator::validate_readonly;
/// use sql_gateway::models::DatabaseType;
///
/// assert!(validate_readonly("SELECT * FROM users", DatabaseType::SQLite).is_ok());
/// assert!(validate_readonly("SELECT 1; DELETE FROM users", DatabaseType::SQLite).is_err());
/// ```
pub fn validate_readonly(sql: &str, db_type: DatabaseType) -> DbResult<()> {
    let dialect = get_dialect(db_type);

    let statements = Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| {
        DbError::policy_violation(format!(
            "statement could not be verified as read-only: {}",
            e
        ))
    })?;

    if statements.is_empty() {
        return Err(DbError::invalid_input("Empty SQL statement"));
    }

    for stmt in &statements {
        if !is_read_only(stmt) {
            return Err(DbError::policy_violation(format!(
                "{} is not allowed in read-only mode",
                operation_name(stmt)
            )));
        }
    }

    Ok(())
}

fn is_read_only(stmt: &Statement) -> bool {
    match stmt {
        Statement::Query(_)
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ExplainTable { .. } => true,
        Statement::Explain { statement, .. } => is_read_only(statement),
        Statement::Pragma { value: None, .. } => true,
        _ => false,
    }
}

/// Leading keyword of the statement's canonical form, for error messages.
fn operation_name(stmt: &Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}
