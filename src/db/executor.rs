//! Statement dispatch.
//!
//! The [`QueryExecutor`] runs one statement against the backend named by a
//! [`ConnectionDescriptor`] and returns a uniform [`ExecutionResult`].
//!
//! # Architecture
//!
//! Every call goes through [`QueryExecutor::prepare`] first, which performs
//! the checks that must happen before any I/O:
//! - the backend is compiled into this build
//! - the read-only gate (and the strict validator when enabled)
//! - classification and row-bound injection
//!
//! Execution then splits by backend, in parallel submodules:
//! - `sqlite`: borrows a handle from the [`SqlitePoolManager`]; the guard
//!   returns it on every path
//! - `postgres` / `mysql`: open a single-use connection and always close it
//!
//! The keyword gate is not the only guard. Read-only SQLite files are opened
//! read-only, and read-only network sessions are put into read-only
//! transaction mode before the statement runs. Row fetches always use the
//! extended protocol, which accepts a single statement.

use crate::db::params::bind_sqlite_params;
use crate::db::pool::SqlitePoolManager;
use crate::db::types::{RowToJson, sqlite_declared_metadata};
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionDescriptor, DatabaseType, ExecutionResult, InsertedId, QueryParam, QueryRequest,
};
use crate::tools::sql_classifier::{
    QueryIntent, has_multiple_statements, rewrite, strip_leading_comments,
};
use crate::tools::sql_validator::validate_readonly;
use serde_json::{Map, Value as JsonValue};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Executor, Statement};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A statement that passed the pre-I/O checks.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub intent: QueryIntent,
    /// The SQL that will run, after row-bound injection
    pub sql: String,
    /// Row bound that was requested
    pub limit: u32,
    pub explain: bool,
}

impl PreparedQuery {
    /// Whether a row bound was injected and the result may have been cut off.
    pub fn is_truncated(&self, row_count: usize) -> bool {
        self.intent.wants_limit(self.limit) && row_count >= self.limit as usize
    }

    /// The plan statement for an explain request.
    fn explain_sql(&self, db_type: DatabaseType) -> String {
        match db_type {
            DatabaseType::SQLite => format!("EXPLAIN QUERY PLAN {}", self.sql),
            _ => format!("EXPLAIN {}", self.sql),
        }
    }
}

/// Routes statements to SQLite, PostgreSQL or MySQL.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    pool: Arc<SqlitePoolManager>,
    strict: bool,
}

impl QueryExecutor {
    /// Create an executor that borrows SQLite handles from `pool`.
    pub fn new(pool: Arc<SqlitePoolManager>) -> Self {
        Self {
            pool,
            strict: false,
        }
    }

    /// Enable parser-based validation of read-only statements.
    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Run the checks that must pass before any connection is made.
    ///
    /// Fails with [`DbError::BackendUnavailable`] for compiled-out backends
    /// and [`DbError::PolicyViolation`] for writes under read-only mode.
    pub fn prepare(
        &self,
        descriptor: &ConnectionDescriptor,
        request: &QueryRequest,
    ) -> DbResult<PreparedQuery> {
        if !descriptor.db_type.is_available() {
            return Err(DbError::backend_unavailable(descriptor.db_type));
        }
        if strip_leading_comments(&request.sql).trim().is_empty() {
            return Err(DbError::invalid_input("Empty SQL statement"));
        }

        let (intent, sql) = rewrite(&request.sql, request.limit);

        if descriptor.read_only {
            if intent.is_write {
                return Err(DbError::policy_violation(
                    "write statements are not allowed in read-only mode",
                ));
            }
            if has_multiple_statements(&request.sql) {
                return Err(DbError::policy_violation(
                    "multiple statements are not allowed in read-only mode",
                ));
            }
            if self.strict {
                validate_readonly(&request.sql, descriptor.db_type)?;
            }
        }

        Ok(PreparedQuery {
            intent,
            sql,
            limit: request.limit,
            explain: request.explain,
        })
    }

    /// Prepare and run a statement.
    pub async fn execute(
        &self,
        descriptor: &ConnectionDescriptor,
        request: &QueryRequest,
    ) -> DbResult<ExecutionResult> {
        let prepared = self.prepare(descriptor, request)?;
        self.execute_prepared(descriptor, &prepared, &request.params)
            .await
    }

    /// Run a statement that already passed [`QueryExecutor::prepare`].
    pub async fn execute_prepared(
        &self,
        descriptor: &ConnectionDescriptor,
        prepared: &PreparedQuery,
        params: &[QueryParam],
    ) -> DbResult<ExecutionResult> {
        let start = Instant::now();
        let db_type = descriptor.db_type;

        debug!(
            db_type = %db_type,
            location = %descriptor.location,
            sql = %prepared.sql,
            params = params.len(),
            "Executing statement"
        );

        let result = match db_type {
            DatabaseType::SQLite => match self.pool.acquire(descriptor).await {
                Ok(mut conn) => sqlite::run(&mut conn, prepared, params).await,
                Err(e) => Err(e),
            },
            #[cfg(feature = "postgres")]
            DatabaseType::PostgreSQL => postgres::run(descriptor, prepared, params).await,
            #[cfg(feature = "mysql")]
            DatabaseType::MySQL => mysql::run(descriptor, prepared, params).await,
            #[allow(unreachable_patterns)]
            other => Err(DbError::backend_unavailable(other)),
        }
        .map_err(|e| e.for_backend(db_type))?;

        debug!(
            db_type = %db_type,
            elapsed_ms = start.elapsed().as_millis() as u64,
            rows = result.row_count(),
            changes = ?result.changes,
            "Statement complete"
        );
        Ok(result)
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

/// Plan rows as text, one line per row.
///
/// SQLite `EXPLAIN QUERY PLAN` rows are indented by their parent chain;
/// single-column plans (PostgreSQL) use the value; anything else is shown as
/// `column=value` pairs.
fn render_plan(rows: &[Map<String, JsonValue>]) -> String {
    let mut depths: Vec<(i64, usize)> = Vec::new();
    let mut lines = Vec::with_capacity(rows.len());

    for row in rows {
        if let Some(detail) = row.get("detail") {
            let id = row.get("id").and_then(JsonValue::as_i64).unwrap_or(0);
            let parent = row.get("parent").and_then(JsonValue::as_i64).unwrap_or(0);
            let depth = depths
                .iter()
                .find(|(node, _)| *node == parent)
                .map(|(_, d)| d + 1)
                .unwrap_or(0);
            depths.push((id, depth));
            lines.push(format!("{}{}", "  ".repeat(depth), value_text(detail)));
        } else if row.len() == 1 {
            lines.extend(row.values().map(value_text));
        } else {
            let pairs: Vec<String> = row
                .iter()
                .map(|(k, v)| format!("{}={}", k, value_text(v)))
                .collect();
            lines.push(pairs.join(", "));
        }
    }

    lines.join("\n")
}

fn value_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

fn rows_to_json<R: RowToJson>(rows: &[R]) -> Vec<Map<String, JsonValue>> {
    rows.iter().map(RowToJson::to_json_map).collect()
}

// =============================================================================
// Backend-Specific Implementations
// =============================================================================
//
// Each module below follows the same shape: explain, row-returning, write.

mod sqlite {
    use super::*;

    pub async fn run(
        conn: &mut SqliteConnection,
        prepared: &PreparedQuery,
        params: &[QueryParam],
    ) -> DbResult<ExecutionResult> {
        if prepared.explain {
            let sql = prepared.explain_sql(DatabaseType::SQLite);
            let rows: Vec<SqliteRow> = bind_sqlite_params(sqlx::query(&sql), params)
                .fetch_all(&mut *conn)
                .await?;
            return Ok(ExecutionResult::explain(render_plan(&rows_to_json(&rows))));
        }

        if prepared.intent.returns_rows {
            let rows: Vec<SqliteRow> = bind_sqlite_params(sqlx::query(&prepared.sql), params)
                .fetch_all(&mut *conn)
                .await?;
            let columns = match rows.first() {
                Some(first) => first.column_metadata(),
                // Zero rows: fall back to the statement's declared columns
                None => match (&mut *conn).prepare(&prepared.sql).await {
                    Ok(statement) => sqlite_declared_metadata(statement.columns()),
                    Err(_) => Vec::new(),
                },
            };
            return Ok(ExecutionResult::rows(columns, rows_to_json(&rows)));
        }

        let result = bind_sqlite_params(sqlx::query(&prepared.sql), params)
            .execute(&mut *conn)
            .await?;
        let changes = result.rows_affected();
        let rowid = result.last_insert_rowid();
        let inserted = (prepared.intent.inserts_rows() && changes > 0 && rowid != 0)
            .then_some(InsertedId::Signed(rowid));
        Ok(ExecutionResult::write(changes, inserted))
    }
}

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_params;
    use crate::db::types::pg_column_metadata;
    use sqlx::Connection;
    use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
    use std::str::FromStr;
    use tracing::warn;

    /// Connection options for a descriptor; read-only targets get sessions
    /// whose transactions cannot write.
    pub(super) fn connect_options(
        descriptor: &ConnectionDescriptor,
    ) -> DbResult<PgConnectOptions> {
        let options = PgConnectOptions::from_str(&descriptor.connect_url())?;
        Ok(if descriptor.read_only {
            options.options([("default_transaction_read_only", "on")])
        } else {
            options
        })
    }

    pub async fn run(
        descriptor: &ConnectionDescriptor,
        prepared: &PreparedQuery,
        params: &[QueryParam],
    ) -> DbResult<ExecutionResult> {
        let mut conn = PgConnection::connect_with(&connect_options(descriptor)?).await?;
        let result = run_on(&mut conn, prepared, params).await;
        if let Err(e) = conn.close().await {
            warn!(db_type = "postgres", error = %e, "Failed to close connection");
        }
        result
    }

    async fn run_on(
        conn: &mut PgConnection,
        prepared: &PreparedQuery,
        params: &[QueryParam],
    ) -> DbResult<ExecutionResult> {
        if prepared.explain {
            let sql = prepared.explain_sql(DatabaseType::PostgreSQL);
            let rows = fetch_rows(conn, &sql, params).await?;
            return Ok(ExecutionResult::explain(render_plan(&rows_to_json(&rows))));
        }

        if prepared.intent.returns_rows {
            let rows = fetch_rows(conn, &prepared.sql, params).await?;
            let columns = match rows.first() {
                Some(first) => first.column_metadata(),
                None => match (&mut *conn).prepare(&prepared.sql).await {
                    Ok(statement) => pg_column_metadata(statement.columns()),
                    Err(_) => Vec::new(),
                },
            };
            return Ok(ExecutionResult::rows(columns, rows_to_json(&rows)));
        }

        // Without params, run as a simple query so utility statements work
        let result = if params.is_empty() {
            (&mut *conn).execute(prepared.sql.as_str()).await?
        } else {
            bind_postgres_params(sqlx::query(&prepared.sql), params)
                .execute(&mut *conn)
                .await?
        };
        Ok(ExecutionResult::write(result.rows_affected(), None))
    }

    async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<PgRow>> {
        Ok(bind_postgres_params(sqlx::query(sql), params)
            .fetch_all(&mut *conn)
            .await?)
    }
}

#[cfg(feature = "mysql")]
mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_params;
    use crate::db::types::mysql_column_metadata;
    use sqlx::Connection;
    use sqlx::mysql::{MySqlConnection, MySqlRow};
    use tracing::warn;

    /// Makes every later transaction on the session read-only.
    pub(super) const READ_ONLY_SESSION: &str = "SET SESSION TRANSACTION READ ONLY";

    pub async fn run(
        descriptor: &ConnectionDescriptor,
        prepared: &PreparedQuery,
        params: &[QueryParam],
    ) -> DbResult<ExecutionResult> {
        let mut conn = MySqlConnection::connect(&descriptor.connect_url()).await?;
        let result = if descriptor.read_only {
            match (&mut conn).execute(READ_ONLY_SESSION).await {
                Ok(_) => run_on(&mut conn, prepared, params).await,
                Err(e) => Err(e.into()),
            }
        } else {
            run_on(&mut conn, prepared, params).await
        };
        if let Err(e) = conn.close().await {
            warn!(db_type = "mysql", error = %e, "Failed to close connection");
        }
        result
    }

    async fn run_on(
        conn: &mut MySqlConnection,
        prepared: &PreparedQuery,
        params: &[QueryParam],
    ) -> DbResult<ExecutionResult> {
        if prepared.explain {
            let sql = prepared.explain_sql(DatabaseType::MySQL);
            let rows = fetch_rows(conn, &sql, params).await?;
            return Ok(ExecutionResult::explain(render_plan(&rows_to_json(&rows))));
        }

        if prepared.intent.returns_rows {
            let rows = fetch_rows(conn, &prepared.sql, params).await?;
            let columns = match rows.first() {
                Some(first) => first.column_metadata(),
                None => match (&mut *conn).prepare(&prepared.sql).await {
                    Ok(statement) => mysql_column_metadata(statement.columns()),
                    Err(_) => Vec::new(),
                },
            };
            return Ok(ExecutionResult::rows(columns, rows_to_json(&rows)));
        }

        // Some statements (e.g. CREATE PROCEDURE) cannot be prepared
        let result = if params.is_empty() {
            (&mut *conn).execute(prepared.sql.as_str()).await?
        } else {
            bind_mysql_params(sqlx::query(&prepared.sql), params)
                .execute(&mut *conn)
                .await?
        };
        let changes = result.rows_affected();
        let id = result.last_insert_id();
        let inserted = (prepared.intent.inserts_rows() && changes > 0 && id != 0)
            .then_some(InsertedId::Unsigned(id));
        Ok(ExecutionResult::write(changes, inserted))
    }

    async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<MySqlRow>> {
        Ok(bind_mysql_params(sqlx::query(sql), params)
            .fetch_all(&mut *conn)
            .await?)
    }
}
