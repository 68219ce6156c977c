//! MCP service implementation using rmcp.
//!
//! `GatewayService` exposes the gateway as three tools: `query`,
//! `describe_schema` and `list_backends`. Handlers share one SQLite pool.

use crate::config::Config;
use crate::db::{PoolStats, QueryExecutor, SchemaInspector, SqlitePoolManager};
use crate::models::DatabaseType;
use crate::tools::query::{QueryInput, QueryOutput, QueryToolHandler};
use crate::tools::schema::{DescribeSchemaInput, DescribeSchemaOutput, SchemaToolHandler};
use rmcp::Json;
use rmcp::{
    ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    schemars::JsonSchema,
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use std::sync::Arc;

/// One backend and whether this build can reach it.
#[derive(Debug, Serialize, JsonSchema)]
pub struct BackendInfo {
    pub db_type: DatabaseType,
    pub name: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_port: Option<u16>,
}

/// Output for the list_backends tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ListBackendsOutput {
    pub backends: Vec<BackendInfo>,
    /// Current SQLite pool occupancy
    pub pool: PoolStats,
}

#[derive(Clone)]
pub struct GatewayService {
    pool: Arc<SqlitePoolManager>,
    query_handler: QueryToolHandler,
    schema_handler: SchemaToolHandler,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl GatewayService {
    /// Create a service over an existing pool.
    pub fn new(pool: Arc<SqlitePoolManager>, config: &Config) -> Self {
        let executor =
            QueryExecutor::new(Arc::clone(&pool)).with_strict_validation(config.strict_sql);
        let query_handler = QueryToolHandler::new(executor, config.database_url.clone())
            .with_default_limit(config.default_limit);
        let schema_handler = SchemaToolHandler::new(
            SchemaInspector::new(Arc::clone(&pool)),
            config.database_url.clone(),
        );

        Self {
            pool,
            query_handler,
            schema_handler,
            tool_router: Self::tool_router(),
        }
    }

    /// The shared SQLite pool.
    pub fn pool(&self) -> &Arc<SqlitePoolManager> {
        &self.pool
    }
}

#[tool_router]
impl GatewayService {
    #[tool(
        description = "Execute one SQL statement against SQLite, PostgreSQL or MySQL.\nTarget: database_url (sqlite:<path>, :memory:, <file>.db, postgres://..., mysql://...), defaulting to the server's DATABASE_URL.\nreadonly defaults to true and rejects writes before connecting.\nSELECT statements without a LIMIT get one appended (limit, default 100; 0 = unbounded).\nformat: json (default) or table. explain: return the query plan instead of executing."
    )]
    async fn query(&self, Parameters(input): Parameters<QueryInput>) -> Json<QueryOutput> {
        Json(self.query_handler.query(input).await)
    }

    #[tool(
        description = "Describe a SQLite database schema.\nWith `table`: columns, indexes, foreign keys, triggers and row count for one table or view.\nWithout: every table and view plus engine version and file size.\nFor `:memory:` it inspects the database that `query` writes to with readonly=false."
    )]
    async fn describe_schema(
        &self,
        Parameters(input): Parameters<DescribeSchemaInput>,
    ) -> Json<DescribeSchemaOutput> {
        Json(self.schema_handler.describe(input).await)
    }

    #[tool(description = "List the database backends this server can reach and the SQLite pool occupancy.")]
    async fn list_backends(&self) -> Json<ListBackendsOutput> {
        let backends = [DatabaseType::SQLite, DatabaseType::PostgreSQL, DatabaseType::MySQL]
            .into_iter()
            .map(|db_type| BackendInfo {
                db_type,
                name: db_type.display_name().to_string(),
                available: db_type.is_available(),
                default_port: db_type.default_port(),
            })
            .collect();
        Json(ListBackendsOutput {
            backends,
            pool: self.pool.stats(),
        })
    }
}

#[tool_handler]
impl ServerHandler for GatewayService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sql-gateway".to_owned(),
                title: Some("SQL Gateway".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "SQL gateway for SQLite, PostgreSQL and MySQL.\n\
                \n\
                ## Workflow\n\
                1. Call `list_backends` to see which database kinds are usable\n\
                2. Call `describe_schema` on a SQLite target to learn its tables\n\
                3. Call `query` with `database_url` (or rely on the server default)\n\
                \n\
                ## Safety\n\
                - `readonly` defaults to true; set it to false for INSERT/UPDATE/DELETE/DDL\n\
                - SELECT results are bounded to 100 rows unless `limit` says otherwise\n\
                \n\
                ## Errors\n\
                Failures are returned in the result with `success: false` and an `error` message."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    fn create_test_service() -> GatewayService {
        let pool = SqlitePoolManager::new(PoolConfig::default());
        GatewayService::new(pool, &Config::default())
    }

    #[tokio::test]
    async fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "sql-gateway");
        assert!(info.capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn test_list_backends_always_includes_sqlite() {
        let service = create_test_service();
        let Json(output) = service.list_backends().await;
        assert_eq!(output.backends.len(), 3);
        let sqlite = &output.backends[0];
        assert_eq!(sqlite.db_type, DatabaseType::SQLite);
        assert!(sqlite.available);
        assert_eq!(output.pool, PoolStats::default());
    }
}
