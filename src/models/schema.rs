//! Schema-related data models.
//!
//! These documents are read-only snapshots assembled by the introspector.
//! They are built fresh on every call and never cached.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of catalog object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Table,
    View,
}

impl ObjectKind {
    /// Parse the `type` column of `sqlite_master`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Some(Self::Table),
            "view" => Some(Self::View),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub name: String,
    pub kind: ObjectKind,
    pub columns: Vec<ColumnDefinition>,
    /// Empty for views
    pub indexes: Vec<IndexInfo>,
    /// Empty for views
    pub foreign_keys: Vec<ForeignKey>,
    pub triggers: Vec<TriggerInfo>,
    pub create_statement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl TableSchema {
    /// Create an empty document for a catalog object.
    pub fn new(
        name: impl Into<String>,
        kind: ObjectKind,
        create_statement: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            triggers: Vec::new(),
            create_statement: create_statement.into(),
            row_count: None,
        }
    }

    /// Names of primary key columns in key order.
    pub fn primary_key(&self) -> Vec<&str> {
        let mut pk: Vec<&ColumnDefinition> = self
            .columns
            .iter()
            .filter(|c| c.primary_key_order > 0)
            .collect();
        pk.sort_by_key(|c| c.primary_key_order);
        pk.into_iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDefinition {
    pub ordinal_position: i64,
    pub name: String,
    /// Declared type as written in the CREATE statement; may be empty
    pub declared_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position in the primary key, 0 if not part of it
    pub primary_key_order: i64,
}

/// How an index came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    /// CREATE INDEX
    ExplicitCreate,
    /// UNIQUE constraint in the table definition
    UniqueConstraint,
    PrimaryKey,
}

impl IndexOrigin {
    /// Parse the `origin` column of `PRAGMA index_list`.
    pub fn parse(s: &str) -> Self {
        match s {
            "u" => Self::UniqueConstraint,
            "pk" => Self::PrimaryKey,
            _ => Self::ExplicitCreate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexInfo {
    pub sequence: i64,
    pub name: String,
    pub is_unique: bool,
    pub origin: IndexOrigin,
    pub is_partial: bool,
    /// Member columns in index order
    pub columns: Vec<String>,
}

/// One row of a foreign key; composite keys share a `group_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKey {
    pub group_id: i64,
    pub sequence_in_group: i64,
    pub referenced_table: String,
    pub local_column: String,
    /// None when the key references the parent's primary key implicitly
    pub referenced_column: Option<String>,
    pub on_update: ForeignKeyAction,
    pub on_delete: ForeignKeyAction,
    pub match_type: String,
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Parse from database-specific string.
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            "RESTRICT" => Self::Restrict,
            _ => Self::NoAction,
        }
    }
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAction => write!(f, "NO ACTION"),
            Self::Restrict => write!(f, "RESTRICT"),
            Self::Cascade => write!(f, "CASCADE"),
            Self::SetNull => write!(f, "SET NULL"),
            Self::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TriggerInfo {
    pub name: String,
    /// INSERT, UPDATE, DELETE, or UNKNOWN if the statement could not be read
    pub event: String,
    /// BEFORE, AFTER or INSTEAD OF
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<String>,
    pub table_name: String,
    pub create_statement: String,
}

impl TriggerInfo {
    /// Build trigger info from its `sqlite_master` row, reading the event from the SQL.
    pub fn from_catalog(
        name: impl Into<String>,
        table_name: impl Into<String>,
        create_statement: impl Into<String>,
    ) -> Self {
        let create_statement = create_statement.into();
        let (timing, event) = parse_trigger_header(&create_statement);
        Self {
            name: name.into(),
            event,
            timing,
            table_name: table_name.into(),
            create_statement,
        }
    }
}

/// Read timing and event from the words preceding `ON` in a CREATE TRIGGER.
fn parse_trigger_header(sql: &str) -> (Option<String>, String) {
    let upper = sql.to_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|w| !w.is_empty())
        .take_while(|w| *w != "ON")
        .collect();

    let mut timing = None;
    let mut event = "UNKNOWN".to_string();
    for (i, word) in words.iter().enumerate() {
        match *word {
            "BEFORE" | "AFTER" => timing = Some(word.to_string()),
            "INSTEAD" if words.get(i + 1) == Some(&"OF") => timing = Some("INSTEAD OF".to_string()),
            "INSERT" | "UPDATE" | "DELETE" => event = word.to_string(),
            _ => {}
        }
    }
    (timing, event)
}

/// Whole-database snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseSchema {
    pub engine_version: String,
    pub page_size: u64,
    pub page_count: u64,
    pub size_bytes: u64,
    /// e.g. "1.50 MiB"
    pub size_human: String,
    pub tables: Vec<TableSchema>,
    pub views: Vec<TableSchema>,
    /// RFC 3339 timestamp of the snapshot
    pub introspected_at: String,
}

impl DatabaseSchema {
    /// Total number of objects in the snapshot.
    pub fn object_count(&self) -> usize {
        self.tables.len() + self.views.len()
    }

    /// Total triggers across all objects.
    pub fn trigger_count(&self) -> usize {
        self.tables
            .iter()
            .chain(self.views.iter())
            .map(|t| t.triggers.len())
            .sum()
    }
}
