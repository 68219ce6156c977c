//! Error types for the SQL gateway.
//!
//! Every failure path in the gateway produces a [`DbError`]. Variants carry
//! enough context for a caller to decide whether to retry, fix its input, or
//! give up, and most of them expose an actionable suggestion.

use crate::models::DatabaseType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Unknown connection target: {target}")]
    UnknownTarget { target: String },

    #[error("Policy violation: {message}")]
    PolicyViolation { message: String },

    #[error("Timed out acquiring a connection after {elapsed_ms}ms")]
    PoolTimeout { elapsed_ms: u64 },

    #[error("{backend} error: {message}")]
    Backend {
        backend: DatabaseType,
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: Option<String>,
        /// True for failures that happened before a statement could run
        connection: bool,
    },

    #[error("Not found: {object}")]
    NotFound { object: String },

    #[error("{backend} backend is not available in this build")]
    BackendUnavailable { backend: DatabaseType },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an unknown-target error.
    pub fn unknown_target(target: impl Into<String>) -> Self {
        Self::UnknownTarget {
            target: target.into(),
        }
    }

    /// Create a policy violation error.
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::PolicyViolation {
            message: message.into(),
        }
    }

    /// Create a pool timeout error.
    pub fn pool_timeout(elapsed_ms: u64) -> Self {
        Self::PoolTimeout { elapsed_ms }
    }

    /// Create a backend error reported while executing a statement.
    pub fn backend(backend: DatabaseType, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
            sql_state: None,
            suggestion: None,
            connection: false,
        }
    }

    /// Create a backend error for a failed connection attempt.
    pub fn connection(
        backend: DatabaseType,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
            sql_state: None,
            suggestion: Some(suggestion.into()),
            connection: true,
        }
    }

    /// Create a not-found error.
    pub fn not_found(object: impl Into<String>) -> Self {
        Self::NotFound {
            object: object.into(),
        }
    }

    /// Create a backend-unavailable error.
    pub fn backend_unavailable(backend: DatabaseType) -> Self {
        Self::BackendUnavailable { backend }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach the backend kind to an error converted from a driver error.
    ///
    /// `From<sqlx::Error>` cannot know which backend produced the error, so
    /// dispatch code re-tags it here. SQLite messages also pass through the
    /// hint normalizer at this point.
    pub fn for_backend(self, db_type: DatabaseType) -> Self {
        match self {
            Self::Backend {
                message,
                sql_state,
                suggestion,
                connection,
                ..
            } => {
                let message = if db_type == DatabaseType::SQLite {
                    crate::db::hints::normalize_sqlite_error(&message)
                } else {
                    message
                };
                Self::Backend {
                    backend: db_type,
                    message,
                    sql_state,
                    suggestion,
                    connection,
                }
            }
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::UnknownTarget { .. } => Some(
                "Use sqlite:<path>, :memory:, a .db/.sqlite/.sqlite3 path, postgres://... or mysql://...",
            ),
            Self::PolicyViolation { .. } => {
                Some("Set readonly to false to run statements that modify data")
            }
            Self::PoolTimeout { .. } => {
                Some("All connections for this database are busy; retry shortly")
            }
            Self::Backend { suggestion, .. } => suggestion.as_deref(),
            Self::BackendUnavailable { .. } => {
                Some("Rebuild with the matching cargo feature enabled")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolTimeout { .. }
                | Self::Backend {
                    connection: true,
                    ..
                }
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// The backend defaults to SQLite; networked dispatch re-tags with
/// [`DbError::for_backend`].
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let backend = DatabaseType::SQLite;
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                backend,
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => DbError::Backend {
                backend,
                message: db_err.message().to_string(),
                sql_state: db_err.code().map(|c| c.to_string()),
                suggestion: None,
                connection: false,
            },
            sqlx::Error::Io(io_err) => DbError::connection(
                backend,
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                backend,
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                backend,
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                backend,
                "Timed out opening a connection",
                "Check that the database server is reachable",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::backend(backend, format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                DbError::backend(backend, format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            other => DbError::backend(backend, other.to_string()),
        }
    }
}

/// Result type alias for gateway operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData.
///
/// Tool handlers report gateway failures inside their result envelope; this
/// conversion is used for protocol-level failures such as malformed
/// arguments.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            DbError::UnknownTarget { .. }
            | DbError::PolicyViolation { .. }
            | DbError::InvalidInput { .. }
            | DbError::BackendUnavailable { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }

            DbError::NotFound { .. } => rmcp::ErrorData::resource_not_found(err.to_string(), data),

            DbError::Backend { sql_state, .. } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", err, code),
                    None => err.to_string(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            DbError::PoolTimeout { .. } | DbError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), data)
            }
        }
    }
}
