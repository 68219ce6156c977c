//! Query tool.
//!
//! Resolves the connection target, runs one statement through the
//! [`QueryExecutor`] and wraps the outcome in a [`QueryOutput`] envelope.
//! Gateway failures (bad target, policy violation, pool timeout, backend
//! error) are reported inside the envelope with `success: false`.

use crate::db::QueryExecutor;
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnMetadata, ConnectionDescriptor, DEFAULT_ROW_LIMIT, DatabaseType, ExecutionResult,
    InsertedId, QueryParam, QueryRequest,
};
use crate::tools::format::{OutputFormat, format_as_table, format_write_summary};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{info, warn};

fn default_readonly() -> bool {
    true
}

/// Input for the query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// SQL statement to execute
    pub query: String,
    /// Connection target: sqlite:<path>, :memory:, <file>.db, postgres://... or mysql://...
    /// Falls back to the server's DATABASE_URL when omitted.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Reject statements that modify data or schema. Default: true
    #[serde(default = "default_readonly")]
    pub readonly: bool,
    /// Row bound appended to SELECT statements without a LIMIT. Default: 100, 0 = unbounded
    #[serde(default)]
    pub limit: Option<u32>,
    /// "json" (default) returns rows; "table" also renders an ASCII grid
    #[serde(default)]
    pub format: OutputFormat,
    /// Return the query plan instead of executing the statement
    #[serde(default)]
    pub explain: bool,
    /// Positional bind values (? or $1, $2... placeholders)
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

/// Result envelope for the query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    pub success: bool,
    /// Backend the statement was routed to; absent when the target could not be parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_type: Option<DatabaseType>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    pub columns: Vec<ColumnMetadata>,
    pub elapsed_ms: u64,
    /// The SQL that ran, after row-bound injection
    pub sql: String,
    /// True when an injected row bound may have cut the result short
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain_plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Rows changed by a write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<InsertedId>,
    /// Rendered grid or write summary when format is "table"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl QueryOutput {
    fn pending(sql: String) -> Self {
        Self {
            success: false,
            db_type: None,
            rows: Vec::new(),
            row_count: 0,
            columns: Vec::new(),
            elapsed_ms: 0,
            sql,
            truncated: None,
            explain_plan: None,
            error: None,
            suggestion: None,
            changes: None,
            last_insert_id: None,
            table: None,
        }
    }

    fn failed(mut self, err: DbError, start: Instant) -> Self {
        self.elapsed_ms = start.elapsed().as_millis() as u64;
        self.suggestion = err.suggestion().map(String::from);
        self.error = Some(err.to_string());
        self
    }

    fn succeeded(
        mut self,
        result: ExecutionResult,
        truncated: bool,
        format: OutputFormat,
        start: Instant,
    ) -> Self {
        self.success = true;
        self.elapsed_ms = start.elapsed().as_millis() as u64;

        if let Some(plan) = result.explain_plan {
            self.table = (format == OutputFormat::Table).then(|| plan.clone());
            self.explain_plan = Some(plan);
            return self;
        }

        if let Some(changes) = result.changes {
            self.changes = Some(changes);
            self.last_insert_id = result.last_insert_id;
            if format == OutputFormat::Table {
                self.table = Some(format_write_summary(
                    changes,
                    result.last_insert_id,
                    self.elapsed_ms,
                ));
            }
            return self;
        }

        if format == OutputFormat::Table {
            self.table = Some(format_as_table(
                &result.columns,
                &result.rows,
                self.elapsed_ms,
            ));
        }
        self.row_count = result.rows.len();
        self.rows = result.rows;
        self.columns = result.columns;
        self.truncated = Some(truncated);
        self
    }
}

/// Handler for the query tool.
#[derive(Debug, Clone)]
pub struct QueryToolHandler {
    executor: QueryExecutor,
    default_target: Option<String>,
    default_limit: u32,
}

impl QueryToolHandler {
    /// Create a handler; `default_target` serves calls without a `database_url`.
    pub fn new(executor: QueryExecutor, default_target: Option<String>) -> Self {
        Self {
            executor,
            default_target,
            default_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Set the row bound used when a call passes no limit.
    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    /// Handle the query tool call.
    pub async fn query(&self, input: QueryInput) -> QueryOutput {
        let start = Instant::now();
        let request = QueryRequest::new(input.query)
            .with_limit(input.limit.unwrap_or(self.default_limit))
            .with_params(input.params)
            .with_explain(input.explain);
        let mut output = QueryOutput::pending(request.sql.clone());

        let descriptor =
            match resolve_target(input.database_url.as_deref(), self.default_target.as_deref(), input.readonly) {
                Ok(descriptor) => descriptor,
                Err(e) => return output.failed(e, start),
            };
        output.db_type = Some(descriptor.db_type);

        let prepared = match self.executor.prepare(&descriptor, &request) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(db_type = %descriptor.db_type, error = %e, "Statement rejected");
                return output.failed(e, start);
            }
        };
        output.sql = prepared.sql.clone();

        match self
            .executor
            .execute_prepared(&descriptor, &prepared, &request.params)
            .await
        {
            Ok(result) => {
                let truncated = prepared.is_truncated(result.row_count());
                let output = output.succeeded(result, truncated, input.format, start);
                info!(
                    db_type = %descriptor.db_type,
                    rows = output.row_count,
                    changes = ?output.changes,
                    truncated = ?output.truncated,
                    elapsed_ms = output.elapsed_ms,
                    "Query executed"
                );
                output
            }
            Err(e) => {
                warn!(db_type = %descriptor.db_type, error = %e, "Query failed");
                output.failed(e, start)
            }
        }
    }
}

/// Pick the call's target, or the server default, and parse it.
pub(crate) fn resolve_target(
    database_url: Option<&str>,
    default_target: Option<&str>,
    read_only: bool,
) -> DbResult<ConnectionDescriptor> {
    let target = database_url
        .filter(|url| !url.trim().is_empty())
        .or(default_target)
        .ok_or_else(|| {
            DbError::invalid_input("no database_url given and no DATABASE_URL configured")
        })?;
    ConnectionDescriptor::parse(target, read_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::db::SqlitePoolManager;

    fn handler() -> QueryToolHandler {
        let executor = QueryExecutor::new(SqlitePoolManager::new(PoolConfig::default()));
        QueryToolHandler::new(executor, Some("sqlite::memory:".to_string()))
    }

    fn input(json: serde_json::Value) -> QueryInput {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_query_input_defaults() {
        let input = input(serde_json::json!({"query": "SELECT 1"}));
        assert!(input.readonly);
        assert_eq!(input.limit, None);
        assert_eq!(input.format, OutputFormat::Json);
        assert!(!input.explain);
        assert!(input.params.is_empty());
    }

    #[test]
    fn test_query_input_params() {
        let input = input(serde_json::json!({
            "query": "SELECT * FROM t WHERE a = ? AND b = ?",
            "params": [42, "x", null, 1.5, true]
        }));
        assert_eq!(
            input.params,
            vec![
                QueryParam::Int(42),
                QueryParam::String("x".to_string()),
                QueryParam::Null,
                QueryParam::Float(1.5),
                QueryParam::Bool(true),
            ]
        );
    }

    #[test]
    fn test_resolve_target_prefers_call_argument() {
        let d = resolve_target(Some("app.db"), Some(":memory:"), true).unwrap();
        assert_eq!(d.location, "./app.db");
        let d = resolve_target(Some("  "), Some(":memory:"), true).unwrap();
        assert!(d.is_memory());
        assert!(resolve_target(None, None, true).is_err());
    }

    #[tokio::test]
    async fn test_select_one_envelope() {
        let output = handler()
            .query(input(serde_json::json!({"query": "SELECT 1 as value"})))
            .await;
        assert!(output.success, "{:?}", output.error);
        assert_eq!(output.db_type, Some(DatabaseType::SQLite));
        assert_eq!(output.row_count, 1);
        assert_eq!(output.rows[0]["value"], serde_json::json!(1));
        assert_eq!(output.columns, vec![ColumnMetadata::new("value", "integer")]);
        assert_eq!(output.truncated, Some(false));
        assert_eq!(output.sql, "SELECT 1 as value LIMIT 100");
    }

    #[tokio::test]
    async fn test_unknown_target_reported_in_envelope() {
        let output = handler()
            .query(input(serde_json::json!({
                "query": "SELECT 1",
                "database_url": "redis://localhost"
            })))
            .await;
        assert!(!output.success);
        assert!(output.db_type.is_none());
        assert!(output.error.unwrap().contains("Unknown connection target"));
    }

    #[tokio::test]
    async fn test_table_format_for_write() {
        let output = handler()
            .query(input(serde_json::json!({
                "query": "CREATE TABLE t (id INTEGER PRIMARY KEY)",
                "readonly": false,
                "format": "table"
            })))
            .await;
        assert!(output.success, "{:?}", output.error);
        assert_eq!(output.changes, Some(0));
        assert!(output.table.unwrap().starts_with("Query OK, 0 rows affected"));
    }

    #[test]
    fn test_envelope_uses_camel_case() {
        let output = QueryOutput::pending("SELECT 1".to_string());
        let json = serde_json::to_value(&output).unwrap();
        assert!(json.get("rowCount").is_some());
        assert!(json.get("elapsedMs").is_some());
        assert!(json.get("explainPlan").is_none());
    }
}
