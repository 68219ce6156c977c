//! Schema introspection tool.
//!
//! Implements `describe_schema`: one table or view when `table` is given,
//! otherwise the whole-database document.

use crate::db::SchemaInspector;
use crate::models::{DatabaseSchema, TableSchema};
use crate::tools::query::resolve_target;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Input for the describe_schema tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeSchemaInput {
    /// SQLite target; falls back to the server's DATABASE_URL when omitted
    #[serde(default)]
    pub database_url: Option<String>,
    /// Table or view name. Omit to describe the whole database.
    #[serde(default)]
    pub table: Option<String>,
}

/// Output for the describe_schema tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DescribeSchemaOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<TableSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSchema>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Handler for schema introspection.
#[derive(Debug, Clone)]
pub struct SchemaToolHandler {
    inspector: SchemaInspector,
    default_target: Option<String>,
}

impl SchemaToolHandler {
    pub fn new(inspector: SchemaInspector, default_target: Option<String>) -> Self {
        Self {
            inspector,
            default_target,
        }
    }

    /// Handle the describe_schema tool call.
    pub async fn describe(&self, input: DescribeSchemaInput) -> DescribeSchemaOutput {
        let start = Instant::now();
        let mut output = DescribeSchemaOutput {
            success: false,
            object: None,
            database: None,
            elapsed_ms: 0,
            error: None,
        };

        // Introspection never writes. An in-memory database only exists under
        // the writable key, so that is the one inspected.
        let result = match resolve_target(
            input.database_url.as_deref(),
            self.default_target.as_deref(),
            true,
        )
        .map(|mut descriptor| {
            descriptor.read_only = !descriptor.is_memory();
            descriptor
        }) {
            Ok(descriptor) => match input.table.as_deref().filter(|t| !t.trim().is_empty()) {
                Some(table) => self
                    .inspector
                    .describe_object(&descriptor, table)
                    .await
                    .map(|object| output.object = Some(object)),
                None => self
                    .inspector
                    .describe_database(&descriptor)
                    .await
                    .map(|database| output.database = Some(database)),
            },
            Err(e) => Err(e),
        };

        output.elapsed_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                output.success = true;
                info!(
                    table = ?input.table,
                    elapsed_ms = output.elapsed_ms,
                    "Schema described"
                );
            }
            Err(e) => {
                warn!(table = ?input.table, error = %e, "Schema introspection failed");
                output.error = Some(e.to_string());
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::db::SqlitePoolManager;

    #[tokio::test]
    async fn test_missing_table_is_not_found() {
        let handler = SchemaToolHandler::new(
            SchemaInspector::new(SqlitePoolManager::new(PoolConfig::default())),
            Some(":memory:".to_string()),
        );
        let output = handler
            .describe(DescribeSchemaInput {
                database_url: None,
                table: Some("missing".to_string()),
            })
            .await;
        assert!(!output.success);
        assert!(output.error.unwrap().starts_with("Not found"));
    }

    #[tokio::test]
    async fn test_empty_memory_database() {
        let handler = SchemaToolHandler::new(
            SchemaInspector::new(SqlitePoolManager::new(PoolConfig::default())),
            Some(":memory:".to_string()),
        );
        let output = handler
            .describe(DescribeSchemaInput {
                database_url: None,
                table: None,
            })
            .await;
        assert!(output.success, "{:?}", output.error);
        let database = output.database.unwrap();
        assert_eq!(database.object_count(), 0);
        assert!(!database.engine_version.is_empty());
    }
}
