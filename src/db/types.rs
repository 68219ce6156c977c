//! Row decoding and canonical type names.
//!
//! # Architecture
//!
//! - SQLite columns are typed by the runtime value in the first row
//!   (integer, real, text, binary or null), since SQLite's declared types
//!   are advisory.
//! - PostgreSQL and MySQL columns are mapped from the backend's native type
//!   code through fixed lookup tables; codes missing from a table map to
//!   `"unknown"`.
//! - Values are decoded by [`TypeCategory`], with binary data returned
//!   base64-encoded and temporal values as ISO-8601 strings.

use crate::models::ColumnMetadata;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteColumn, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// Canonical name for a type the lookup tables do not know.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Money,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Interval,
    Unknown,
}

/// Classify a canonical type name into a logical category.
///
/// Names are matched whole, so `interval` is never mistaken for an integer.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    match type_name.to_ascii_lowercase().as_str() {
        "tinyint" | "smallint" | "integer" | "int" | "bigint" | "year" => TypeCategory::Integer,
        "real" | "double" | "float" => TypeCategory::Float,
        "decimal" | "numeric" => TypeCategory::Decimal,
        "money" => TypeCategory::Money,
        "boolean" | "bool" => TypeCategory::Boolean,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "binary" | "bytea" | "blob" => TypeCategory::Binary,
        "date" | "time" | "timetz" | "datetime" | "timestamp" | "timestamptz" => {
            TypeCategory::Temporal
        }
        "interval" => TypeCategory::Interval,
        "char" | "varchar" | "text" | "xml" | "enum" | "set" => TypeCategory::Text,
        _ => TypeCategory::Unknown,
    }
}

/// ISO-8601 duration in PostgreSQL's `iso_8601` interval style.
///
/// Each component keeps its own sign, e.g. `P-1DT-1M-30S`.
pub fn iso8601_interval(months: i32, days: i32, microseconds: i64) -> String {
    let mut out = String::from("P");
    for (value, unit) in [(months / 12, 'Y'), (months % 12, 'M'), (days, 'D')] {
        if value != 0 {
            out.push_str(&format!("{value}{unit}"));
        }
    }

    let hours = microseconds / 3_600_000_000;
    let minutes = microseconds % 3_600_000_000 / 60_000_000;
    let rest = microseconds % 60_000_000;
    if microseconds != 0 {
        out.push('T');
        if hours != 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes != 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if rest != 0 {
            let sign = if rest < 0 { "-" } else { "" };
            let abs = rest.unsigned_abs();
            let (secs, frac) = (abs / 1_000_000, abs % 1_000_000);
            if frac == 0 {
                out.push_str(&format!("{sign}{secs}S"));
            } else {
                let frac = format!("{frac:06}");
                out.push_str(&format!("{sign}{secs}.{}S", frac.trim_end_matches('0')));
            }
        }
    }

    if out == "P" {
        out.push_str("T0S");
    }
    out
}

/// Exact decimal text for a monetary amount stored in hundredths.
pub fn money_text(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Encode binary data as a base64 JSON string.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    /// Column values keyed by column name, in column order.
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;

    /// Column names with canonical types.
    fn column_metadata(&self) -> Vec<ColumnMetadata>;
}

// =============================================================================
// SQLite
// =============================================================================

/// Canonical name for a SQLite storage class as reported by the driver.
fn sqlite_storage_class(driver_name: &str) -> &'static str {
    match driver_name {
        "INTEGER" => "integer",
        "REAL" => "real",
        "TEXT" => "text",
        "BLOB" => "binary",
        "NULL" => "null",
        _ => UNKNOWN_TYPE,
    }
}

/// Runtime type of one value in a SQLite row.
pub fn sqlite_value_type(row: &SqliteRow, idx: usize) -> &'static str {
    match row.try_get_raw(idx) {
        Ok(value) if value.is_null() => "null",
        Ok(value) => sqlite_storage_class(value.type_info().name()),
        Err(_) => UNKNOWN_TYPE,
    }
}

/// Column metadata from a prepared statement, for results with no rows.
///
/// Uses the declared column type; expression columns report `"null"`.
pub fn sqlite_declared_metadata(columns: &[SqliteColumn]) -> Vec<ColumnMetadata> {
    columns
        .iter()
        .map(|col| {
            let declared = col.type_info().name();
            let type_name = match declared {
                "NULL" => "null".to_string(),
                "BLOB" => "binary".to_string(),
                other => other.to_lowercase(),
            };
            ColumnMetadata::new(col.name(), type_name)
        })
        .collect()
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let value = match sqlite_value_type(self, idx) {
                    "integer" => self
                        .try_get::<i64, _>(idx)
                        .map(JsonValue::from)
                        .unwrap_or(JsonValue::Null),
                    "real" => self
                        .try_get::<f64, _>(idx)
                        .map(float_value)
                        .unwrap_or(JsonValue::Null),
                    "binary" => self
                        .try_get::<Vec<u8>, _>(idx)
                        .map(|b| encode_binary(&b))
                        .unwrap_or(JsonValue::Null),
                    "text" => self
                        .try_get::<String, _>(idx)
                        .map(JsonValue::String)
                        .unwrap_or(JsonValue::Null),
                    _ => JsonValue::Null,
                };
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| ColumnMetadata::new(col.name(), sqlite_value_type(self, idx)))
            .collect()
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// Built-in PostgreSQL type OIDs and their canonical names.
pub const PG_TYPE_NAMES: &[(u32, &str)] = &[
    (16, "boolean"),
    (17, "binary"),
    (18, "char"),
    (19, "text"),
    (20, "bigint"),
    (21, "smallint"),
    (23, "integer"),
    (25, "text"),
    (26, "integer"),
    (114, "json"),
    (142, "xml"),
    (700, "real"),
    (701, "double"),
    (790, "money"),
    (869, "inet"),
    (1042, "char"),
    (1043, "varchar"),
    (1082, "date"),
    (1083, "time"),
    (1114, "timestamp"),
    (1184, "timestamptz"),
    (1186, "interval"),
    (1266, "timetz"),
    (1700, "numeric"),
    (2950, "uuid"),
    (3802, "json"),
];

/// Canonical name for a PostgreSQL type OID.
pub fn canonical_pg_type(oid: Option<u32>) -> &'static str {
    oid.and_then(|oid| {
        PG_TYPE_NAMES
            .iter()
            .find(|(code, _)| *code == oid)
            .map(|(_, name)| *name)
    })
    .unwrap_or(UNKNOWN_TYPE)
}

#[cfg(feature = "postgres")]
pub use self::postgres::pg_column_metadata;

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use sqlx::postgres::types::{PgInterval, PgMoney, PgTimeTz};
    use sqlx::postgres::{PgColumn, PgRow, PgTypeInfo};

    fn canonical(type_info: &PgTypeInfo) -> &'static str {
        canonical_pg_type(type_info.oid().map(|oid| oid.0))
    }

    /// Column metadata for PostgreSQL columns.
    pub fn pg_column_metadata(columns: &[PgColumn]) -> Vec<ColumnMetadata> {
        columns
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), canonical(col.type_info())))
            .collect()
    }

    impl RowToJson for PgRow {
        fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
            self.columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let category = categorize_type(canonical(col.type_info()));
                    (col.name().to_string(), decode_column(self, idx, category))
                })
                .collect()
        }

        fn column_metadata(&self) -> Vec<ColumnMetadata> {
            pg_column_metadata(self.columns())
        }
    }

    fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        if row.try_get_raw(idx).is_ok_and(|v| v.is_null()) {
            return JsonValue::Null;
        }
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<bool, _>(idx)
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|b| encode_binary(&b))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => row.try_get::<JsonValue, _>(idx).unwrap_or(JsonValue::Null),
            TypeCategory::Uuid => row
                .try_get::<sqlx::types::Uuid, _>(idx)
                .map(|u| JsonValue::String(u.to_string()))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Temporal => decode_temporal(row, idx),
            // NUMERIC keeps its exact textual form
            TypeCategory::Decimal => row
                .try_get::<sqlx::types::Decimal, _>(idx)
                .map(|d| JsonValue::String(d.to_string()))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Money => row
                .try_get::<PgMoney, _>(idx)
                .map(|m| JsonValue::String(money_text(m.0)))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Interval => row
                .try_get::<PgInterval, _>(idx)
                .map(|i| JsonValue::String(iso8601_interval(i.months, i.days, i.microseconds)))
                .unwrap_or(JsonValue::Null),
            _ => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return JsonValue::from(v);
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return JsonValue::from(v);
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return JsonValue::from(v);
        }
        if let Ok(v) = row.try_get::<sqlx::postgres::types::Oid, _>(idx) {
            return JsonValue::from(v.0);
        }
        decode_text(row, idx)
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return float_value(v);
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_temporal(row: &PgRow, idx: usize) -> JsonValue {
        use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return JsonValue::String(v.to_rfc3339());
        }
        if let Ok(v) = row.try_get::<PgTimeTz, _>(idx) {
            return JsonValue::String(format!("{}{}", v.time, v.offset));
        }
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        decode_text(row, idx)
    }

    /// Text or any type whose wire form is valid UTF-8.
    fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get_unchecked::<String, _>(idx)
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}

// =============================================================================
// MySQL
// =============================================================================

/// MySQL type names (as reported by the driver, without `UNSIGNED`) and their canonical names.
pub const MYSQL_TYPE_NAMES: &[(&str, &str)] = &[
    ("BOOLEAN", "boolean"),
    ("TINYINT", "tinyint"),
    ("SMALLINT", "smallint"),
    ("MEDIUMINT", "integer"),
    ("INT", "integer"),
    ("BIGINT", "bigint"),
    ("FLOAT", "real"),
    ("DOUBLE", "double"),
    ("DECIMAL", "decimal"),
    ("BIT", "bit"),
    ("YEAR", "year"),
    ("DATE", "date"),
    ("TIME", "time"),
    ("DATETIME", "datetime"),
    ("TIMESTAMP", "timestamp"),
    ("CHAR", "char"),
    ("VARCHAR", "varchar"),
    ("TINYTEXT", "text"),
    ("TEXT", "text"),
    ("MEDIUMTEXT", "text"),
    ("LONGTEXT", "text"),
    ("BINARY", "binary"),
    ("VARBINARY", "binary"),
    ("TINYBLOB", "binary"),
    ("BLOB", "binary"),
    ("MEDIUMBLOB", "binary"),
    ("LONGBLOB", "binary"),
    ("JSON", "json"),
    ("ENUM", "enum"),
    ("SET", "set"),
    ("GEOMETRY", "geometry"),
    ("NULL", "null"),
];

/// Canonical name for a MySQL driver type name.
pub fn canonical_mysql_type(driver_name: &str) -> &'static str {
    let base = driver_name
        .trim()
        .trim_end_matches(" UNSIGNED")
        .to_ascii_uppercase();
    MYSQL_TYPE_NAMES
        .iter()
        .find(|(name, _)| *name == base)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(UNKNOWN_TYPE)
}

#[cfg(feature = "mysql")]
pub use self::mysql::mysql_column_metadata;

#[cfg(feature = "mysql")]
mod mysql {
    use super::*;
    use sqlx::mysql::{MySqlColumn, MySqlRow};

    /// Column metadata for MySQL columns.
    pub fn mysql_column_metadata(columns: &[MySqlColumn]) -> Vec<ColumnMetadata> {
        columns
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), canonical_mysql_type(col.type_info().name())))
            .collect()
    }

    impl RowToJson for MySqlRow {
        fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
            self.columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let canonical = canonical_mysql_type(col.type_info().name());
                    let category = categorize_type(canonical);
                    (col.name().to_string(), decode_column(self, idx, category))
                })
                .collect()
        }

        fn column_metadata(&self) -> Vec<ColumnMetadata> {
            mysql_column_metadata(self.columns())
        }
    }

    fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        if row.try_get_raw(idx).is_ok_and(|v| v.is_null()) {
            return JsonValue::Null;
        }
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<bool, _>(idx)
                .map(JsonValue::Bool)
                .unwrap_or_else(|_| decode_integer(row, idx)),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|b| encode_binary(&b))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Json => row.try_get::<JsonValue, _>(idx).unwrap_or(JsonValue::Null),
            TypeCategory::Temporal => decode_temporal(row, idx),
            // DECIMAL keeps its exact textual form
            _ => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return JsonValue::from(v);
        }
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return JsonValue::from(v);
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return JsonValue::from(v);
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return JsonValue::from(v);
        }
        decode_text(row, idx)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return float_value(v);
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_temporal(row: &MySqlRow, idx: usize) -> JsonValue {
        use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return JsonValue::String(v.to_rfc3339());
        }
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        decode_text(row, idx)
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get_unchecked::<String, _>(idx)
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}
