//! Database dialect implementations.
//!
//! Each dialect knows how to compile semantic types, normalize the types
//! its database reports, and render every [`Operation`] as SQL.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EvolveError, Result};
use crate::operations::{ColumnDef, ForeignKeyDef, Operation, Statement};
use crate::schema::{ForeignKeyAction, SqlType, SqlValue};
use crate::types::{self, CanonicalType};

static POSTGRES: PostgresDialect = PostgresDialect;
static MYSQL: MySqlDialect = MySqlDialect;
static SQLITE: SqliteDialect = SqliteDialect;

/// The database families with a dialect implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    /// PostgreSQL.
    Postgres,
    /// MySQL and MariaDB.
    MySql,
    /// SQLite.
    Sqlite,
}

impl DialectKind {
    /// Detects the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default().to_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(EvolveError::UnsupportedDialect(scheme)),
        }
    }

    /// Returns the dialect implementation.
    #[must_use]
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            Self::Postgres => &POSTGRES,
            Self::MySql => &MYSQL,
            Self::Sqlite => &SQLITE,
        }
    }

    /// Returns the dialect name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Database-specific type handling and SQL generation.
///
/// The per-operation `*_sql` methods return `None` when the database has no
/// way to express the operation; [`Dialect::generate_sql`] turns that into
/// [`EvolveError::UnsupportedOperation`].
pub trait Dialect: Send + Sync {
    /// Returns the dialect family.
    fn kind(&self) -> DialectKind;

    /// Returns the dialect name.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Compiles a semantic type to this database's type name.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Type used in a column definition (auto-increment may change it).
    fn column_type(&self, column: &ColumnDef) -> String {
        self.type_name(&column.sql_type)
    }

    /// Normalizes a type reported by this database.
    fn normalize_type(&self, raw: &str) -> CanonicalType {
        types::normalize(raw)
    }

    /// Canonical type a declared column compiles to.
    fn canonical_type(&self, sql_type: &SqlType) -> CanonicalType {
        self.normalize_type(&self.type_name(sql_type))
    }

    /// Whether DDL statements can be rolled back.
    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    /// Whether dropping a column also drops the indexes that cover it.
    fn drops_indexes_with_columns(&self) -> bool {
        true
    }

    /// Whether `ADD COLUMN .. NOT NULL DEFAULT <literal>` fills existing
    /// rows, so no backfill is needed.
    fn adds_not_null_columns_with_default(&self) -> bool {
        false
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Placeholder for the `index`th (1-based) statement parameter.
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Keyword that makes a column auto-increment, if one is needed.
    fn auto_increment_keyword(&self, inline_primary_key: bool) -> Option<&'static str>;

    /// Renders a literal.
    fn render_value(&self, value: &SqlValue) -> String {
        value.to_sql()
    }

    /// Generates a column definition.
    fn column_definition(&self, column: &ColumnDef, inline_primary_key: bool) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.column_type(column),
        ];

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", self.render_value(default)));
        }

        if inline_primary_key {
            parts.push("PRIMARY KEY".to_string());
        }

        if column.auto_increment {
            if let Some(keyword) = self.auto_increment_keyword(inline_primary_key) {
                parts.push(keyword.to_string());
            }
        }

        parts.join(" ")
    }

    /// Generates a `FOREIGN KEY` constraint clause.
    fn foreign_key_clause(&self, fk: &ForeignKeyDef) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_identifier(&fk.name),
            self.quote_identifier(&fk.column),
            self.quote_identifier(&fk.references_table),
            self.quote_identifier(&fk.references_column)
        );
        if fk.on_delete != ForeignKeyAction::NoAction {
            sql.push_str(" ON DELETE ");
            sql.push_str(fk.on_delete.to_sql());
        }
        sql
    }

    /// Generates SQL for creating a table.
    fn create_table_sql(
        &self,
        table: &str,
        columns: &[ColumnDef],
        primary_key: &[String],
        foreign_keys: &[ForeignKeyDef],
    ) -> String {
        let inline_pk = primary_key.len() == 1;
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| self.column_definition(c, inline_pk && c.primary_key))
            .collect();

        if primary_key.len() > 1 {
            let quoted: Vec<String> = primary_key
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect();
            defs.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }

        defs.extend(foreign_keys.iter().map(|fk| self.foreign_key_clause(fk)));

        format!(
            "CREATE TABLE {} ({})",
            self.quote_identifier(table),
            defs.join(", ")
        )
    }

    /// Generates SQL for renaming a table.
    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for dropping a table.
    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(table))
    }

    /// Generates SQL for adding a column.
    fn add_column_sql(&self, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column, false)
        )
    }

    /// Generates SQL for dropping a column.
    fn drop_column_sql(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Generates SQL for renaming a column.
    fn rename_column_sql(&self, table: &str, old_name: &str, column: &ColumnDef) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(old_name),
            self.quote_identifier(&column.name)
        ))
    }

    /// Generates SQL for changing a column's type.
    fn alter_type_sql(&self, table: &str, column: &ColumnDef) -> Option<String> {
        let type_name = self.type_name(&column.sql_type);
        Some(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            self.quote_identifier(table),
            self.quote_identifier(&column.name),
            type_name
        ))
    }

    /// Generates SQL for setting a column default.
    fn set_default_sql(&self, table: &str, column: &str, value: &SqlValue) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
            self.quote_identifier(table),
            self.quote_identifier(column),
            self.render_value(value)
        ))
    }

    /// Generates SQL for dropping a column default.
    fn drop_default_sql(&self, table: &str, column: &str) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
            self.quote_identifier(table),
            self.quote_identifier(column)
        ))
    }

    /// Generates the backfill statement for a column default.
    fn apply_default_sql(&self, table: &str, column: &ColumnDef, value: &SqlValue) -> Statement {
        let name = self.quote_identifier(&column.name);
        Statement::with_params(
            format!(
                "UPDATE {} SET {} = {} WHERE {} IS NULL",
                self.quote_identifier(table),
                name,
                self.placeholder(1),
                name
            ),
            vec![value.clone()],
        )
    }

    /// Generates SQL for adding a NOT NULL constraint.
    fn add_not_null_sql(&self, table: &str, column: &ColumnDef) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
            self.quote_identifier(table),
            self.quote_identifier(&column.name)
        ))
    }

    /// Generates SQL for dropping a NOT NULL constraint.
    fn drop_not_null_sql(&self, table: &str, column: &ColumnDef) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
            self.quote_identifier(table),
            self.quote_identifier(&column.name)
        ))
    }

    /// Generates SQL for adding a foreign key constraint.
    fn add_foreign_key_sql(&self, table: &str, fk: &ForeignKeyDef) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.foreign_key_clause(fk)
        ))
    }

    /// Generates SQL for dropping a foreign key constraint.
    fn drop_foreign_key_sql(&self, table: &str, name: &str) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_identifier(table),
            self.quote_identifier(name)
        ))
    }

    /// Generates SQL for creating an index.
    fn create_index_sql(&self, name: &str, table: &str, columns: &[String], unique: bool) -> String {
        let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.quote_identifier(name),
            self.quote_identifier(table),
            quoted.join(", ")
        )
    }

    /// Generates SQL for dropping an index.
    fn drop_index_sql(&self, name: &str, _table: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(name))
    }

    /// Compiles an operation into a statement.
    fn generate_sql(&self, operation: &Operation) -> Result<Statement> {
        let sql = match operation {
            Operation::CreateTable {
                table,
                columns,
                primary_key,
                foreign_keys,
            } => Some(self.create_table_sql(table, columns, primary_key, foreign_keys)),
            Operation::RenameTable { old_name, new_name } => {
                Some(self.rename_table_sql(old_name, new_name))
            }
            Operation::DropTable { table } => Some(self.drop_table_sql(table)),
            Operation::AddColumn { table, column } => Some(self.add_column_sql(table, column)),
            Operation::DropColumn { table, column } => Some(self.drop_column_sql(table, column)),
            Operation::RenameColumn {
                table,
                old_name,
                column,
            } => self.rename_column_sql(table, old_name, column),
            Operation::AlterType { table, column } => self.alter_type_sql(table, column),
            Operation::SetDefault {
                table,
                column,
                value,
            } => self.set_default_sql(table, column, value),
            Operation::DropDefault { table, column } => self.drop_default_sql(table, column),
            Operation::ApplyDefault {
                table,
                column,
                value,
            } => return Ok(self.apply_default_sql(table, column, value)),
            Operation::AddNotNull { table, column } => self.add_not_null_sql(table, column),
            Operation::DropNotNull { table, column } => self.drop_not_null_sql(table, column),
            Operation::AddForeignKey { table, foreign_key } => {
                self.add_foreign_key_sql(table, foreign_key)
            }
            Operation::DropForeignKey { table, name } => self.drop_foreign_key_sql(table, name),
            Operation::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => Some(self.create_index_sql(name, table, columns, *unique)),
            Operation::DropIndex { name, table } => Some(self.drop_index_sql(name, table)),
            Operation::Warning { message } => return Ok(Statement::comment(message)),
        };

        sql.map(Statement::new)
            .ok_or_else(|| EvolveError::UnsupportedOperation {
                dialect: self.name(),
                operation: operation.describe(),
            })
    }
}

impl fmt::Debug for dyn Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dialect({})", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(
            DialectKind::from_url("postgres://localhost/app").unwrap(),
            DialectKind::Postgres
        );
        assert_eq!(
            DialectKind::from_url("postgresql://localhost/app").unwrap(),
            DialectKind::Postgres
        );
        assert_eq!(
            DialectKind::from_url("mysql://root@localhost/app").unwrap(),
            DialectKind::MySql
        );
        assert_eq!(
            DialectKind::from_url("sqlite::memory:").unwrap(),
            DialectKind::Sqlite
        );
        assert!(matches!(
            DialectKind::from_url("oracle://db"),
            Err(EvolveError::UnsupportedDialect(scheme)) if scheme == "oracle"
        ));
    }

    #[test]
    fn test_dialect_lookup() {
        for kind in [DialectKind::Postgres, DialectKind::MySql, DialectKind::Sqlite] {
            assert_eq!(kind.dialect().kind(), kind);
        }
    }

    #[test]
    fn test_warning_becomes_comment() {
        let op = Operation::Warning {
            message: "careful".to_string(),
        };
        for kind in [DialectKind::Postgres, DialectKind::MySql, DialectKind::Sqlite] {
            let stmt = kind.dialect().generate_sql(&op).unwrap();
            assert!(stmt.is_comment());
        }
    }
}
