//! Schema change operations.
//!
//! Operations are dialect-agnostic. A [`crate::dialect::Dialect`] turns each
//! one into a [`Statement`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{ColumnDescriptor, ForeignKeyAction, ForeignKeyRef, SqlType, SqlValue};

/// A column definition resolved for DDL generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Semantic type.
    pub sql_type: SqlType,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Whether this column is part of the primary key.
    pub primary_key: bool,
    /// Whether this column auto-increments.
    pub auto_increment: bool,
    /// Default stored in the database.
    pub default: Option<SqlValue>,
}

impl From<&ColumnDescriptor> for ColumnDef {
    fn from(column: &ColumnDescriptor) -> Self {
        Self {
            name: column.name.clone(),
            sql_type: column.sql_type.clone(),
            nullable: column.nullable,
            primary_key: column.primary_key,
            auto_increment: column.auto_increment,
            default: column
                .default
                .as_ref()
                .and_then(|d| d.database_default())
                .cloned(),
        }
    }
}

impl ColumnDef {
    /// The same definition with different nullability.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// A single-column foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    /// Constraint name.
    pub name: String,
    /// Referencing column.
    pub column: String,
    /// Referenced table.
    pub references_table: String,
    /// Referenced column.
    pub references_column: String,
    /// Action on delete.
    pub on_delete: ForeignKeyAction,
}

impl ForeignKeyDef {
    /// Builds the constraint for `table.column -> target`.
    #[must_use]
    pub fn new(table: &str, column: &str, target: &ForeignKeyRef) -> Self {
        Self {
            name: format!("fk_{}_{}_refs_{}", table, column, target.table),
            column: column.to_string(),
            references_table: target.table.clone(),
            references_column: target.column.clone(),
            on_delete: target.on_delete,
        }
    }
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a new table.
    CreateTable {
        /// Table name.
        table: String,
        /// Column definitions.
        columns: Vec<ColumnDef>,
        /// Primary key column(s).
        primary_key: Vec<String>,
        /// Inline foreign key constraints.
        foreign_keys: Vec<ForeignKeyDef>,
    },

    /// Rename a table.
    RenameTable {
        /// Old table name.
        old_name: String,
        /// New table name.
        new_name: String,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
    },

    /// Add a column. The column is always added as nullable; NOT NULL is a
    /// separate [`Operation::AddNotNull`].
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: ColumnDef,
    },

    /// Drop a column (non-cascading).
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Rename a column.
    RenameColumn {
        /// Table name.
        table: String,
        /// Old column name.
        old_name: String,
        /// The column under its new name.
        column: ColumnDef,
    },

    /// Change a column's type with a cast.
    AlterType {
        /// Table name.
        table: String,
        /// Column with its new type.
        column: ColumnDef,
    },

    /// Set a column's database default.
    SetDefault {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// New default.
        value: SqlValue,
    },

    /// Remove a column's database default.
    DropDefault {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Backfill NULLs in a column with its default.
    ApplyDefault {
        /// Table name.
        table: String,
        /// Column being backfilled.
        column: ColumnDef,
        /// Value written to NULL rows.
        value: SqlValue,
    },

    /// Add a NOT NULL constraint.
    AddNotNull {
        /// Table name.
        table: String,
        /// Column, with `nullable = false`.
        column: ColumnDef,
    },

    /// Drop a NOT NULL constraint.
    DropNotNull {
        /// Table name.
        table: String,
        /// Column, with `nullable = true`.
        column: ColumnDef,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// Table name.
        table: String,
        /// Constraint definition.
        foreign_key: ForeignKeyDef,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// Create an index.
    CreateIndex {
        /// Index name.
        name: String,
        /// Table name.
        table: String,
        /// Indexed columns, in order.
        columns: Vec<String>,
        /// Whether this is a unique index.
        unique: bool,
    },

    /// Drop an index.
    DropIndex {
        /// Index name.
        name: String,
        /// Table name (needed for some databases).
        table: String,
    },

    /// A no-op that surfaces a risk to whoever reads the plan.
    Warning {
        /// The message.
        message: String,
    },
}

impl Operation {
    /// Returns the table this operation touches, if any.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::CreateTable { table, .. }
            | Self::DropTable { table }
            | Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::AlterType { table, .. }
            | Self::SetDefault { table, .. }
            | Self::DropDefault { table, .. }
            | Self::ApplyDefault { table, .. }
            | Self::AddNotNull { table, .. }
            | Self::DropNotNull { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. }
            | Self::CreateIndex { table, .. }
            | Self::DropIndex { table, .. } => Some(table),
            Self::RenameTable { new_name, .. } => Some(new_name),
            Self::Warning { .. } => None,
        }
    }

    /// Short human readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable { table, .. } => format!("create table {table}"),
            Self::RenameTable { old_name, new_name } => {
                format!("rename table {old_name} to {new_name}")
            }
            Self::DropTable { table } => format!("drop table {table}"),
            Self::AddColumn { table, column } => format!("add column {table}.{}", column.name),
            Self::DropColumn { table, column } => format!("drop column {table}.{column}"),
            Self::RenameColumn {
                table,
                old_name,
                column,
            } => format!("rename column {table}.{old_name} to {}", column.name),
            Self::AlterType { table, column } => {
                format!("change the type of {table}.{}", column.name)
            }
            Self::SetDefault { table, column, .. } => format!("set the default of {table}.{column}"),
            Self::DropDefault { table, column } => format!("drop the default of {table}.{column}"),
            Self::ApplyDefault { table, column, .. } => {
                format!("backfill {table}.{}", column.name)
            }
            Self::AddNotNull { table, column } => {
                format!("add NOT NULL to {table}.{}", column.name)
            }
            Self::DropNotNull { table, column } => {
                format!("drop NOT NULL from {table}.{}", column.name)
            }
            Self::AddForeignKey { table, foreign_key } => {
                format!("add foreign key {} on {table}", foreign_key.name)
            }
            Self::DropForeignKey { table, name } => format!("drop foreign key {name} on {table}"),
            Self::CreateIndex { name, table, .. } => format!("create index {name} on {table}"),
            Self::DropIndex { name, table } => format!("drop index {name} on {table}"),
            Self::Warning { message } => message.clone(),
        }
    }
}

/// An SQL template plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// SQL text, with dialect-specific placeholders.
    pub sql: String,
    /// Values bound to the placeholders, in order.
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// A statement without parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A statement with parameters.
    #[must_use]
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// An SQL comment; never sent to the database.
    #[must_use]
    pub fn comment(message: &str) -> Self {
        Self::new(format!("-- {message}"))
    }

    /// Returns whether this statement is only a comment.
    #[must_use]
    pub fn is_comment(&self) -> bool {
        self.sql.trim_start().starts_with("--")
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(SqlValue::to_sql).collect();
            write!(f, "; [{}]", params.join(", "))?;
        }
        Ok(())
    }
}
