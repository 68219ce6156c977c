//! SQL gateway library.
//!
//! Runs SQL statements against SQLite, PostgreSQL and MySQL behind a
//! read-only gate and a row bound, with pooled SQLite connections and SQLite
//! schema introspection. The binary serves these as MCP tools over stdio.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::{Config, PoolConfig};
pub use db::{QueryExecutor, SchemaInspector, SqlitePoolManager};
pub use error::{DbError, DbResult};
pub use mcp::GatewayService;
