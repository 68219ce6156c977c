//! Query-related data models.
//!
//! This module defines types for statement requests and their uniform
//! execution results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default row bound applied to select-like statements.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// A positional parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Arrays and objects, bound as JSON text
    Json(JsonValue),
}

/// A single statement to run against one backend.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<QueryParam>,
    /// Row bound for select-like statements; 0 disables injection.
    pub limit: u32,
    /// Return the plan for the statement instead of executing it.
    pub explain: bool,
}

impl QueryRequest {
    /// Create a new request with the default row bound.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            limit: DEFAULT_ROW_LIMIT,
            explain: false,
        }
    }

    /// Replace all parameters.
    pub fn with_params(mut self, params: Vec<QueryParam>) -> Self {
        self.params = params;
        self
    }

    /// Set the row bound.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Request an explain plan instead of execution.
    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnMetadata {
    pub name: String,
    /// Canonical type name (e.g., "integer", "text", "timestamp", "unknown")
    #[serde(rename = "inferredType")]
    pub type_name: String,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Identifier generated by an insert.
///
/// SQLite rowids are signed 64-bit, MySQL auto-increment values unsigned
/// 64-bit. Both serialize as exact JSON integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum InsertedId {
    Signed(i64),
    Unsigned(u64),
}

impl std::fmt::Display for InsertedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
        }
    }
}

/// Uniform result of one statement, regardless of backend.
///
/// Read results carry rows and columns; write results carry `changes` and
/// possibly `last_insert_id`, never both.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub changes: Option<u64>,
    pub last_insert_id: Option<InsertedId>,
    /// Plan text when the request asked for an explain.
    pub explain_plan: Option<String>,
}

impl ExecutionResult {
    /// Create a result for a row-returning statement.
    pub fn rows(
        columns: Vec<ColumnMetadata>,
        rows: Vec<serde_json::Map<String, JsonValue>>,
    ) -> Self {
        Self {
            columns,
            rows,
            ..Self::default()
        }
    }

    /// Create a result for a write statement.
    pub fn write(changes: u64, last_insert_id: Option<InsertedId>) -> Self {
        Self {
            changes: Some(changes),
            last_insert_id,
            ..Self::default()
        }
    }

    /// Create a result carrying only a plan.
    pub fn explain(plan: String) -> Self {
        Self {
            explain_plan: Some(plan),
            ..Self::default()
        }
    }

    /// Whether this is a write result.
    pub fn is_write(&self) -> bool {
        self.changes.is_some()
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_deserialize_untagged() {
        let params: Vec<QueryParam> =
            serde_json::from_str(r#"[null, true, 7, 1.5, "x", {"a": 1}]"#).unwrap();
        assert_eq!(params[0], QueryParam::Null);
        assert_eq!(params[1], QueryParam::Bool(true));
        assert_eq!(params[2], QueryParam::Int(7));
        assert_eq!(params[3], QueryParam::Float(1.5));
        assert_eq!(params[4], QueryParam::String("x".to_string()));
        assert!(matches!(params[5], QueryParam::Json(_)));
    }

    #[test]
    fn test_request_defaults() {
        let req = QueryRequest::new("SELECT 1");
        assert_eq!(req.limit, DEFAULT_ROW_LIMIT);
        assert!(!req.explain);
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_column_metadata_field_names() {
        let value = serde_json::to_value(ColumnMetadata::new("id", "integer")).unwrap();
        assert_eq!(value, serde_json::json!({"name": "id", "inferredType": "integer"}));
    }

    #[test]
    fn test_inserted_id_serializes_exactly() {
        let big = InsertedId::Signed(9_007_199_254_740_993);
        assert_eq!(serde_json::to_string(&big).unwrap(), "9007199254740993");
        let unsigned = InsertedId::Unsigned(u64::MAX);
        assert_eq!(
            serde_json::to_string(&unsigned).unwrap(),
            "18446744073709551615"
        );
    }

    #[test]
    fn test_write_result_has_no_rows() {
        let result = ExecutionResult::write(3, Some(InsertedId::Signed(10)));
        assert!(result.is_write());
        assert_eq!(result.row_count(), 0);
        assert!(result.columns.is_empty());
    }
}
