//! Database access layer.
//!
//! - Pooled SQLite connections
//! - Statement dispatch to SQLite, PostgreSQL and MySQL
//! - Parameter binding and row decoding
//! - SQLite schema introspection
//! - SQLite error hints

pub mod executor;
pub mod hints;
pub mod params;
pub mod pool;
pub mod schema;
pub mod types;

pub use executor::{PreparedQuery, QueryExecutor};
pub use pool::{PoolKey, PoolStats, PooledConnection, SqlitePoolManager};
pub use schema::SchemaInspector;
