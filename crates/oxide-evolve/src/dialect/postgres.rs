//! PostgreSQL dialect.

use crate::operations::{ColumnDef, Statement};
use crate::schema::{SqlType, SqlValue};

use super::{Dialect, DialectKind};

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal(p, s) => format!("NUMERIC({p}, {s})"),
            SqlType::Char(n) => format!("CHAR({n})"),
            SqlType::Varchar(n) => format!("VARCHAR({n})"),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BYTEA".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::TimestampTz => "TIMESTAMPTZ".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Json => "JSONB".to_string(),
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Array(inner) => format!("{}[]", self.type_name(inner)),
        }
    }

    fn column_type(&self, column: &ColumnDef) -> String {
        // SERIAL types replace an auto-increment keyword.
        match (&column.sql_type, column.auto_increment) {
            (SqlType::SmallInt, true) => "SMALLSERIAL".to_string(),
            (SqlType::Integer, true) => "SERIAL".to_string(),
            (SqlType::BigInt, true) => "BIGSERIAL".to_string(),
            (other, _) => self.type_name(other),
        }
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn auto_increment_keyword(&self, _inline_primary_key: bool) -> Option<&'static str> {
        None
    }

    fn alter_type_sql(&self, table: &str, column: &ColumnDef) -> Option<String> {
        let name = self.quote_identifier(&column.name);
        let type_name = self.type_name(&column.sql_type);
        Some(format!(
            "ALTER TABLE {} ALTER COLUMN {name} TYPE {type_name} USING {name}::{type_name}",
            self.quote_identifier(table),
        ))
    }

    fn apply_default_sql(&self, table: &str, column: &ColumnDef, value: &SqlValue) -> Statement {
        // Parameters arrive untyped; cast to the column type.
        let name = self.quote_identifier(&column.name);
        Statement::with_params(
            format!(
                "UPDATE {} SET {name} = CAST({} AS {}) WHERE {name} IS NULL",
                self.quote_identifier(table),
                self.placeholder(1),
                self.type_name(&column.sql_type),
            ),
            vec![value.clone()],
        )
    }
}
