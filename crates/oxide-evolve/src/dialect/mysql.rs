//! MySQL / MariaDB dialect.
//!
//! Column changes go through `CHANGE` and `MODIFY`, which restate the full
//! column definition. DDL is not transactional.

use crate::operations::ColumnDef;
use crate::schema::{SqlType, SqlValue};

use super::{Dialect, DialectKind};

/// MySQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn modify_sql(&self, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} MODIFY {}",
            self.quote_identifier(table),
            self.column_definition(column, false)
        )
    }
}

impl Dialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "FLOAT".to_string(),
            SqlType::Double => "DOUBLE".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
            SqlType::Char(n) => format!("CHAR({n})"),
            SqlType::Varchar(n) => format!("VARCHAR({n})"),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "LONGBLOB".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "DATETIME".to_string(),
            SqlType::TimestampTz => "TIMESTAMP".to_string(),
            // information_schema reports BOOL as tinyint
            SqlType::Boolean => "TINYINT(1)".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Uuid => "CHAR(36)".to_string(),
            // No native arrays.
            SqlType::Array(_) => "JSON".to_string(),
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn drops_indexes_with_columns(&self) -> bool {
        // Multi-column indexes lose the column but survive.
        false
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn auto_increment_keyword(&self, _inline_primary_key: bool) -> Option<&'static str> {
        Some("AUTO_INCREMENT")
    }

    fn render_value(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            other => other.to_sql(),
        }
    }

    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    fn rename_column_sql(&self, table: &str, old_name: &str, column: &ColumnDef) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} CHANGE {} {}",
            self.quote_identifier(table),
            self.quote_identifier(old_name),
            self.column_definition(column, false)
        ))
    }

    fn alter_type_sql(&self, table: &str, column: &ColumnDef) -> Option<String> {
        Some(self.modify_sql(table, column))
    }

    fn add_not_null_sql(&self, table: &str, column: &ColumnDef) -> Option<String> {
        Some(self.modify_sql(table, &column.clone().with_nullable(false)))
    }

    fn drop_not_null_sql(&self, table: &str, column: &ColumnDef) -> Option<String> {
        Some(self.modify_sql(table, &column.clone().with_nullable(true)))
    }

    fn drop_foreign_key_sql(&self, table: &str, name: &str) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.quote_identifier(table),
            self.quote_identifier(name)
        ))
    }

    fn drop_index_sql(&self, name: &str, table: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(name),
            self.quote_identifier(table)
        )
    }
}
