//! Schema introspection for the embedded SQLite backend.
//!
//! Every document is assembled on one borrowed connection, so it reflects a
//! single point-in-time view of the catalog. Documents are built fresh on
//! each call and never cached.
//!
//! # Architecture
//!
//! Catalog queries live in the `queries` submodule. Per-object metadata comes
//! from SQLite's table-valued pragma functions with the object name bound as
//! a parameter; the one statement that has to interpolate an identifier
//! (`COUNT(*)`) uses a name passed through [`sanitize_identifier`].

use crate::db::pool::SqlitePoolManager;
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnDefinition, ConnectionDescriptor, DatabaseSchema, DatabaseType, ForeignKey,
    ForeignKeyAction, IndexInfo, IndexOrigin, ObjectKind, TableSchema, TriggerInfo,
};
use sqlx::Row;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, warn};

/// Strip quote and backslash characters from an identifier.
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\'' | '"' | '`' | '\\'))
        .collect()
}

/// Builds table, view and whole-database documents.
#[derive(Debug, Clone)]
pub struct SchemaInspector {
    pool: Arc<SqlitePoolManager>,
}

impl SchemaInspector {
    /// Create an inspector that borrows handles from `pool`.
    pub fn new(pool: Arc<SqlitePoolManager>) -> Self {
        Self { pool }
    }

    /// Describe one table or view.
    ///
    /// Fails with [`DbError::NotFound`] when the catalog has no such object.
    pub async fn describe_object(
        &self,
        descriptor: &ConnectionDescriptor,
        name: &str,
    ) -> DbResult<TableSchema> {
        ensure_sqlite(descriptor)?;
        let name = sanitize_identifier(name);
        let mut conn = self.pool.acquire(descriptor).await?;
        sqlite::describe_object(&mut conn, &name)
            .await
            .map_err(|e| e.for_backend(DatabaseType::SQLite))
    }

    /// Describe every table and view in the database.
    pub async fn describe_database(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> DbResult<DatabaseSchema> {
        ensure_sqlite(descriptor)?;
        let mut conn = self.pool.acquire(descriptor).await?;
        sqlite::describe_database(&mut conn)
            .await
            .map_err(|e| e.for_backend(DatabaseType::SQLite))
    }
}

fn ensure_sqlite(descriptor: &ConnectionDescriptor) -> DbResult<()> {
    if descriptor.db_type != DatabaseType::SQLite {
        return Err(DbError::invalid_input(format!(
            "schema introspection supports SQLite targets only, got {}",
            descriptor.db_type
        )));
    }
    Ok(())
}

mod queries {
    pub const OBJECT_BY_NAME: &str = r#"
        SELECT type, sql FROM sqlite_master
        WHERE name = ? AND type IN ('table', 'view')
        "#;

    pub const LIST_TABLES: &str = r#"
        SELECT name FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#;

    pub const LIST_VIEWS: &str = r#"
        SELECT name FROM sqlite_master
        WHERE type = 'view' AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#;

    pub const COLUMNS: &str = r#"
        SELECT cid, name, type, "notnull", dflt_value, pk
        FROM pragma_table_info(?)
        ORDER BY cid
        "#;

    pub const INDEXES: &str = r#"
        SELECT seq, name, "unique", origin, partial
        FROM pragma_index_list(?)
        ORDER BY seq
        "#;

    pub const INDEX_COLUMNS: &str = r#"
        SELECT name FROM pragma_index_info(?)
        ORDER BY seqno
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT id, seq, "table", "from", "to", on_update, on_delete, "match"
        FROM pragma_foreign_key_list(?)
        ORDER BY id, seq
        "#;

    pub const TRIGGERS: &str = r#"
        SELECT name, sql FROM sqlite_master
        WHERE type = 'trigger' AND tbl_name = ?
        ORDER BY name
        "#;

    pub const STORED_ROW_COUNT: &str = "SELECT stat FROM sqlite_stat1 WHERE tbl = ? LIMIT 1";

    pub const ENGINE_VERSION: &str = "SELECT sqlite_version()";
    pub const PAGE_SIZE: &str = "PRAGMA page_size";
    pub const PAGE_COUNT: &str = "PRAGMA page_count";
}

mod sqlite {
    use super::*;

    pub async fn describe_object(conn: &mut SqliteConnection, name: &str) -> DbResult<TableSchema> {
        let row = sqlx::query(queries::OBJECT_BY_NAME)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found(format!("table or view '{}'", name)))?;

        let kind_str: String = row.try_get("type")?;
        let kind = ObjectKind::parse(&kind_str)
            .ok_or_else(|| DbError::not_found(format!("table or view '{}'", name)))?;
        let create_statement: Option<String> = row.try_get("sql")?;

        let mut schema = TableSchema::new(name, kind, create_statement.unwrap_or_default());
        schema.columns = fetch_columns(conn, name).await?;

        if kind == ObjectKind::Table {
            schema.indexes = fetch_indexes(conn, name).await?;
            schema.foreign_keys = fetch_foreign_keys(conn, name).await?;
        }

        schema.triggers = fetch_triggers(conn, name).await?;

        if kind == ObjectKind::Table {
            schema.row_count = fetch_row_count(conn, name).await;
        }

        debug!(
            object = name,
            kind = %kind,
            columns = schema.columns.len(),
            indexes = schema.indexes.len(),
            "Described SQLite object"
        );
        Ok(schema)
    }

    pub async fn describe_database(conn: &mut SqliteConnection) -> DbResult<DatabaseSchema> {
        let engine_version: String = sqlx::query_scalar(queries::ENGINE_VERSION)
            .fetch_one(&mut *conn)
            .await?;
        let page_size: i64 = sqlx::query_scalar(queries::PAGE_SIZE)
            .fetch_one(&mut *conn)
            .await?;
        let page_count: i64 = sqlx::query_scalar(queries::PAGE_COUNT)
            .fetch_one(&mut *conn)
            .await?;

        let table_names: Vec<String> = sqlx::query_scalar(queries::LIST_TABLES)
            .fetch_all(&mut *conn)
            .await?;
        let view_names: Vec<String> = sqlx::query_scalar(queries::LIST_VIEWS)
            .fetch_all(&mut *conn)
            .await?;

        let mut tables = Vec::with_capacity(table_names.len());
        for name in &table_names {
            tables.push(describe_object(conn, name).await?);
        }
        let mut views = Vec::with_capacity(view_names.len());
        for name in &view_names {
            views.push(describe_object(conn, name).await?);
        }

        let page_size = page_size.max(0) as u64;
        let page_count = page_count.max(0) as u64;
        let size_bytes = page_size * page_count;

        debug!(
            tables = tables.len(),
            views = views.len(),
            size_bytes,
            "Described SQLite database"
        );

        Ok(DatabaseSchema {
            engine_version,
            page_size,
            page_count,
            size_bytes,
            size_human: humansize::format_size(size_bytes, humansize::BINARY),
            tables,
            views,
            introspected_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn fetch_columns(
        conn: &mut SqliteConnection,
        name: &str,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::COLUMNS)
            .bind(name)
            .fetch_all(&mut *conn)
            .await?;

        rows.iter()
            .map(|row| -> DbResult<ColumnDefinition> {
                Ok(ColumnDefinition {
                    ordinal_position: row.try_get("cid")?,
                    name: row.try_get("name")?,
                    declared_type: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
                    not_null: row.try_get::<i64, _>("notnull")? != 0,
                    default_value: row.try_get("dflt_value")?,
                    primary_key_order: row.try_get("pk")?,
                })
            })
            .collect()
    }

    async fn fetch_indexes(conn: &mut SqliteConnection, table: &str) -> DbResult<Vec<IndexInfo>> {
        let rows = sqlx::query(queries::INDEXES)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name")?;
            let origin: String = row.try_get("origin")?;
            let columns = fetch_index_columns(conn, &name).await?;
            indexes.push(IndexInfo {
                sequence: row.try_get("seq")?,
                is_unique: row.try_get::<i64, _>("unique")? != 0,
                origin: IndexOrigin::parse(&origin),
                is_partial: row.try_get::<i64, _>("partial")? != 0,
                name,
                columns,
            });
        }
        Ok(indexes)
    }

    async fn fetch_index_columns(conn: &mut SqliteConnection, index: &str) -> DbResult<Vec<String>> {
        let names: Vec<Option<String>> = sqlx::query_scalar(queries::INDEX_COLUMNS)
            .bind(index)
            .fetch_all(&mut *conn)
            .await?;
        // Expression members have no column name
        Ok(names
            .into_iter()
            .map(|n| n.unwrap_or_else(|| "<expression>".to_string()))
            .collect())
    }

    async fn fetch_foreign_keys(
        conn: &mut SqliteConnection,
        table: &str,
    ) -> DbResult<Vec<ForeignKey>> {
        let rows = sqlx::query(queries::FOREIGN_KEYS)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;

        rows.iter()
            .map(|row| -> DbResult<ForeignKey> {
                let on_update: String = row.try_get("on_update")?;
                let on_delete: String = row.try_get("on_delete")?;
                Ok(ForeignKey {
                    group_id: row.try_get("id")?,
                    sequence_in_group: row.try_get("seq")?,
                    referenced_table: row.try_get("table")?,
                    local_column: row.try_get("from")?,
                    referenced_column: row.try_get("to")?,
                    on_update: ForeignKeyAction::parse(&on_update),
                    on_delete: ForeignKeyAction::parse(&on_delete),
                    match_type: row.try_get("match")?,
                })
            })
            .collect()
    }

    async fn fetch_triggers(conn: &mut SqliteConnection, name: &str) -> DbResult<Vec<TriggerInfo>> {
        let rows = sqlx::query(queries::TRIGGERS)
            .bind(name)
            .fetch_all(&mut *conn)
            .await?;

        rows.iter()
            .map(|row| -> DbResult<TriggerInfo> {
                let trigger: String = row.try_get("name")?;
                let sql: Option<String> = row.try_get("sql")?;
                Ok(TriggerInfo::from_catalog(trigger, name, sql.unwrap_or_default()))
            })
            .collect()
    }

    /// Row count from `sqlite_stat1` when present, else an exact count.
    ///
    /// Failures are logged and leave the count unset.
    pub(super) async fn fetch_row_count(conn: &mut SqliteConnection, table: &str) -> Option<u64> {
        let stored: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar(queries::STORED_ROW_COUNT)
                .bind(table)
                .fetch_optional(&mut *conn)
                .await;
        if let Some(count) = stored.ok().flatten().as_deref().and_then(parse_stat_row_count) {
            return Some(count);
        }

        let sql = format!("SELECT COUNT(*) FROM \"{}\"", sanitize_identifier(table));
        match sqlx::query_scalar::<_, i64>(&sql).fetch_one(&mut *conn).await {
            Ok(count) => Some(count.max(0) as u64),
            Err(e) => {
                warn!(table, error = %e, "Row count unavailable");
                None
            }
        }
    }
}

/// First field of a `sqlite_stat1.stat` value is the table's row estimate.
fn parse_stat_row_count(stat: &str) -> Option<u64> {
    stat.split_whitespace().next()?.parse().ok()
}
