//! Positional parameter binding.
//!
//! Binds `QueryParam` values onto backend-specific sqlx queries. Used by the
//! dispatcher for statements, explain plans and single-use network calls.

use crate::models::QueryParam;
use sqlx::Sqlite;
use sqlx::sqlite::SqliteArguments;

/// Bind every parameter in order to a SQLite query.
pub(crate) fn bind_sqlite_params<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [QueryParam],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            // No native JSON type; stored as text
            QueryParam::Json(v) => query.bind(v.to_string()),
        };
    }
    query
}

/// Bind every parameter in order to a PostgreSQL query.
#[cfg(feature = "postgres")]
pub(crate) fn bind_postgres_params<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &'q [QueryParam],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Json(v) => query.bind(sqlx::types::Json(v)),
        };
    }
    query
}

/// Bind every parameter in order to a MySQL query.
#[cfg(feature = "mysql")]
pub(crate) fn bind_mysql_params<'q>(
    mut query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    params: &'q [QueryParam],
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    for param in params {
        query = match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Json(v) => query.bind(sqlx::types::Json(v)),
        };
    }
    query
}
