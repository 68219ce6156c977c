//! Data models for the SQL gateway.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionDescriptor, Credentials, DatabaseType, MEMORY_LOCATION};
pub use query::{
    ColumnMetadata, DEFAULT_ROW_LIMIT, ExecutionResult, InsertedId, QueryParam, QueryRequest,
};
pub use schema::{
    ColumnDefinition, DatabaseSchema, ForeignKey, ForeignKeyAction, IndexInfo, IndexOrigin,
    ObjectKind, TableSchema, TriggerInfo,
};
