//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support: types, NOT NULL, defaults and
//! foreign keys are fixed at table creation. Those operations are reported
//! as unsupported instead of being rewritten as a table rebuild. A new NOT
//! NULL column can still be added when it has a literal default.
//!
//! Declared types only select a column affinity, so types are compared by
//! affinity rather than by spelling.

use crate::operations::{ColumnDef, ForeignKeyDef};
use crate::schema::{SqlType, SqlValue};
use crate::types::{self, CanonicalType};

use super::{Dialect, DialectKind};

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer | SqlType::SmallInt | SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Text | SqlType::Varchar(_) | SqlType::Char(_) => "TEXT".to_string(),
            SqlType::Boolean => "INTEGER".to_string(),
            SqlType::Timestamp | SqlType::TimestampTz => "TEXT".to_string(),
            SqlType::Date | SqlType::Time => "TEXT".to_string(),
            SqlType::Real | SqlType::Double => "REAL".to_string(),
            SqlType::Decimal(_, _) => "NUMERIC".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Json | SqlType::Uuid => "TEXT".to_string(),
            // Stored as a JSON document.
            SqlType::Array(_) => "TEXT".to_string(),
        }
    }

    fn normalize_type(&self, raw: &str) -> CanonicalType {
        let canonical = types::normalize(raw);
        if canonical.is_array() {
            return canonical;
        }
        CanonicalType::new(affinity(raw))
    }

    fn drops_indexes_with_columns(&self) -> bool {
        // DROP COLUMN refuses indexed columns.
        false
    }

    fn adds_not_null_columns_with_default(&self) -> bool {
        true
    }

    fn auto_increment_keyword(&self, inline_primary_key: bool) -> Option<&'static str> {
        // Only valid on an INTEGER PRIMARY KEY column.
        inline_primary_key.then_some("AUTOINCREMENT")
    }

    fn render_value(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            other => other.to_sql(),
        }
    }

    fn alter_type_sql(&self, _table: &str, _column: &ColumnDef) -> Option<String> {
        None
    }

    fn set_default_sql(&self, _table: &str, _column: &str, _value: &SqlValue) -> Option<String> {
        None
    }

    fn drop_default_sql(&self, _table: &str, _column: &str) -> Option<String> {
        None
    }

    fn add_not_null_sql(&self, _table: &str, _column: &ColumnDef) -> Option<String> {
        None
    }

    fn drop_not_null_sql(&self, _table: &str, _column: &ColumnDef) -> Option<String> {
        None
    }

    fn add_foreign_key_sql(&self, _table: &str, _fk: &ForeignKeyDef) -> Option<String> {
        None
    }

    fn drop_foreign_key_sql(&self, _table: &str, _name: &str) -> Option<String> {
        None
    }
}

/// Storage token for a declared SQLite type. Follows the affinity rules,
/// except that booleans count as integers and temporal, JSON and UUID
/// types count as text, which is how this dialect stores them.
fn affinity(raw: &str) -> &'static str {
    let t = raw.trim().to_uppercase();
    let has = |needles: &[&str]| needles.iter().any(|n| t.contains(n));

    if has(&["INT", "BOOL"]) {
        "integer"
    } else if has(&["CHAR", "CLOB", "TEXT", "DATE", "TIME", "JSON", "UUID"]) {
        "text"
    } else if t.is_empty() || has(&["BLOB"]) {
        "blob"
    } else if has(&["REAL", "FLOA", "DOUB"]) {
        "real"
    } else {
        "numeric"
    }
}
