//! Tool implementations.
//!
//! - `sql_classifier`: read/write classification and row-bound injection
//! - `sql_validator`: parser-based read-only validation (strict mode)
//! - `format`: JSON/table output rendering
//! - `query`: the `query` tool handler and result envelope
//! - `schema`: the `describe_schema` tool handler

pub mod format;
pub mod query;
pub mod schema;
pub mod sql_classifier;
pub mod sql_validator;

pub use format::OutputFormat;
pub use query::{QueryInput, QueryOutput, QueryToolHandler};
pub use schema::{DescribeSchemaInput, DescribeSchemaOutput, SchemaToolHandler};
