//! Integration tests for SQLite schema introspection.

use serde_json::json;
use sql_gateway::config::PoolConfig;
use sql_gateway::db::{QueryExecutor, SchemaInspector, SqlitePoolManager};
use sql_gateway::error::DbError;
use sql_gateway::models::{
    ConnectionDescriptor, ForeignKeyAction, IndexOrigin, ObjectKind, QueryRequest,
};
use sql_gateway::tools::query::{QueryInput, QueryToolHandler};
use sql_gateway::tools::schema::{DescribeSchemaInput, SchemaToolHandler};
use std::sync::Arc;
use tempfile::TempDir;

const FIXTURE: &[&str] = &[
    "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE books (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL DEFAULT 'untitled',
        author_id INTEGER REFERENCES authors(id) ON DELETE CASCADE
    )",
    "CREATE INDEX idx_books_title ON books (title, author_id)",
    "CREATE VIEW book_titles AS SELECT b.title, a.name FROM books b JOIN authors a ON a.id = b.author_id",
    "CREATE TRIGGER books_audit AFTER INSERT ON books BEGIN SELECT 1; END",
    "INSERT INTO authors (name) VALUES ('le guin'), ('banks')",
    "INSERT INTO books (title, author_id) VALUES ('the dispossessed', 1), ('excession', 2), ('lathe', 1)",
];

struct Fixture {
    _dir: TempDir,
    pool: Arc<SqlitePoolManager>,
    target: ConnectionDescriptor,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let location = format!("sqlite:{}", dir.path().join("library.db").display());
    let pool = SqlitePoolManager::new(PoolConfig::default());
    let executor = QueryExecutor::new(Arc::clone(&pool));

    let writable = ConnectionDescriptor::parse(&location, false).unwrap();
    for sql in FIXTURE {
        executor
            .execute(&writable, &QueryRequest::new(*sql))
            .await
            .unwrap();
    }

    Fixture {
        _dir: dir,
        pool,
        target: ConnectionDescriptor::parse(&location, true).unwrap(),
    }
}

#[tokio::test]
async fn test_table_columns_indexes_and_foreign_keys() {
    let f = fixture().await;
    let inspector = SchemaInspector::new(Arc::clone(&f.pool));
    let books = inspector.describe_object(&f.target, "books").await.unwrap();

    assert_eq!(books.kind, ObjectKind::Table);
    let names: Vec<&str> = books.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "title", "author_id"]);
    assert_eq!(books.primary_key(), ["id"]);

    let title = &books.columns[1];
    assert_eq!(title.ordinal_position, 1);
    assert_eq!(title.declared_type, "TEXT");
    assert!(title.not_null);
    assert_eq!(title.default_value.as_deref(), Some("'untitled'"));

    assert_eq!(books.indexes.len(), 1);
    let index = &books.indexes[0];
    assert_eq!(index.name, "idx_books_title");
    assert_eq!(index.columns, ["title", "author_id"]);
    assert_eq!(index.origin, IndexOrigin::ExplicitCreate);
    assert!(!index.is_unique);

    assert_eq!(books.foreign_keys.len(), 1);
    let fk = &books.foreign_keys[0];
    assert_eq!(fk.local_column, "author_id");
    assert_eq!(fk.referenced_table, "authors");
    assert_eq!(fk.referenced_column.as_deref(), Some("id"));
    assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
    assert_eq!(fk.on_update, ForeignKeyAction::NoAction);

    assert_eq!(books.row_count, Some(3));
    assert!(books.create_statement.starts_with("CREATE TABLE books"));
}

#[tokio::test]
async fn test_trigger_event_and_timing() {
    let f = fixture().await;
    let inspector = SchemaInspector::new(Arc::clone(&f.pool));
    let books = inspector.describe_object(&f.target, "books").await.unwrap();

    assert_eq!(books.triggers.len(), 1);
    let trigger = &books.triggers[0];
    assert_eq!(trigger.name, "books_audit");
    assert_eq!(trigger.event, "INSERT");
    assert_eq!(trigger.timing.as_deref(), Some("AFTER"));
    assert_eq!(trigger.table_name, "books");
}

#[tokio::test]
async fn test_view_has_columns_only() {
    let f = fixture().await;
    let inspector = SchemaInspector::new(Arc::clone(&f.pool));
    let view = inspector.describe_object(&f.target, "book_titles").await.unwrap();

    assert_eq!(view.kind, ObjectKind::View);
    let names: Vec<&str> = view.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["title", "name"]);
    assert!(view.indexes.is_empty());
    assert!(view.foreign_keys.is_empty());
    assert_eq!(view.row_count, None);
}

#[tokio::test]
async fn test_quoted_name_is_sanitized() {
    let f = fixture().await;
    let inspector = SchemaInspector::new(Arc::clone(&f.pool));
    let authors = inspector.describe_object(&f.target, "\"authors\"").await.unwrap();
    assert_eq!(authors.name, "authors");
    assert_eq!(authors.row_count, Some(2));
}

#[tokio::test]
async fn test_stat1_row_count_preferred() {
    let f = fixture().await;
    let executor = QueryExecutor::new(Arc::clone(&f.pool));
    let mut writable = f.target.clone();
    writable.read_only = false;
    executor
        .execute(&writable, &QueryRequest::new("ANALYZE"))
        .await
        .unwrap();
    // A stale stat row wins over the live count
    executor
        .execute(&writable, &QueryRequest::new("INSERT INTO authors (name) VALUES ('egan')"))
        .await
        .unwrap();

    let inspector = SchemaInspector::new(Arc::clone(&f.pool));
    let authors = inspector.describe_object(&f.target, "authors").await.unwrap();
    assert_eq!(authors.row_count, Some(2));
}

#[tokio::test]
async fn test_missing_object_is_not_found() {
    let f = fixture().await;
    let inspector = SchemaInspector::new(Arc::clone(&f.pool));
    let err = inspector.describe_object(&f.target, "nope").await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
}

#[tokio::test]
async fn test_whole_database_document() {
    let f = fixture().await;
    let inspector = SchemaInspector::new(Arc::clone(&f.pool));
    let database = inspector.describe_database(&f.target).await.unwrap();

    let tables: Vec<&str> = database.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tables, ["authors", "books"]);
    let views: Vec<&str> = database.views.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(views, ["book_titles"]);
    assert_eq!(database.object_count(), 3);
    assert_eq!(database.trigger_count(), 1);

    assert!(database.page_size > 0);
    assert!(database.page_count > 0);
    assert_eq!(database.size_bytes, database.page_size * database.page_count);
    assert!(database.size_human.ends_with("KiB"), "{}", database.size_human);
    assert!(database.engine_version.starts_with('3'));
    assert!(chrono::DateTime::parse_from_rfc3339(&database.introspected_at).is_ok());
}

#[tokio::test]
async fn test_failed_row_count_leaves_document_intact() {
    let f = fixture().await;
    let executor = QueryExecutor::new(Arc::clone(&f.pool));
    let mut writable = f.target.clone();
    writable.read_only = false;
    // The sanitized COUNT(*) target ("its") does not exist, so counting fails
    executor
        .execute(&writable, &QueryRequest::new("CREATE TABLE \"it's\" (a INTEGER)"))
        .await
        .unwrap();

    let inspector = SchemaInspector::new(Arc::clone(&f.pool));
    let database = inspector.describe_database(&f.target).await.unwrap();

    let odd = database.tables.iter().find(|t| t.name == "it's").unwrap();
    assert_eq!(odd.row_count, None);
    assert_eq!(odd.columns.len(), 1);
    let books = database.tables.iter().find(|t| t.name == "books").unwrap();
    assert_eq!(books.row_count, Some(3));
}

#[tokio::test]
async fn test_network_target_rejected() {
    let pool = SqlitePoolManager::new(PoolConfig::default());
    let inspector = SchemaInspector::new(pool);
    let target = ConnectionDescriptor::parse("postgres://localhost/app", true).unwrap();
    let err = inspector.describe_database(&target).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_tool_output_serialization() {
    let f = fixture().await;
    let handler = SchemaToolHandler::new(
        SchemaInspector::new(Arc::clone(&f.pool)),
        Some(format!("sqlite:{}", f.target.location)),
    );
    let output = handler
        .describe(DescribeSchemaInput {
            database_url: None,
            table: Some("authors".to_string()),
        })
        .await;
    assert!(output.success, "{:?}", output.error);

    let value = serde_json::to_value(&output).unwrap();
    assert_eq!(value["object"]["kind"], json!("table"));
    assert_eq!(value["object"]["columns"][0]["name"], json!("id"));
    assert!(value.get("elapsedMs").is_some());
    assert!(value.get("database").is_none());
}

#[tokio::test]
async fn test_memory_tables_created_by_query_are_visible() {
    let pool = SqlitePoolManager::new(PoolConfig::default());
    let query = QueryToolHandler::new(
        QueryExecutor::new(Arc::clone(&pool)),
        Some(":memory:".to_string()),
    );
    let schema = SchemaToolHandler::new(
        SchemaInspector::new(Arc::clone(&pool)),
        Some(":memory:".to_string()),
    );

    let input: QueryInput = serde_json::from_value(json!({
        "query": "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)",
        "readonly": false
    }))
    .unwrap();
    let created = query.query(input).await;
    assert!(created.success, "{:?}", created.error);

    let output = schema
        .describe(DescribeSchemaInput {
            database_url: None,
            table: Some("notes".to_string()),
        })
        .await;
    assert!(output.success, "{:?}", output.error);
    let notes = output.object.unwrap();
    let names: Vec<&str> = notes.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "body"]);
}
