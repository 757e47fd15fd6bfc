//! JSON schema files.
//!
//! A schema file declares tables for callers that don't build descriptors
//! in code, such as the `oxide-evolve` binary:
//!
//! ```json
//! {
//!   "tables": [
//!     {
//!       "name": "users",
//!       "aka": ["people"],
//!       "columns": [
//!         { "name": "id", "type": "integer", "primary_key": true, "auto_increment": true },
//!         { "name": "email", "type": { "varchar": 255 }, "nullable": false, "unique": true },
//!         { "name": "team_id", "type": "integer",
//!           "references": { "table": "teams", "column": "id", "on_delete": "cascade" } }
//!       ],
//!       "indexes": [{ "columns": ["team_id", "email"], "unique": true }]
//!     }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EvolveError, Result};
use crate::registry::Registry;
use crate::schema::{
    ColumnDescriptor, ForeignKeyRef, IndexDescriptor, SqlType, SqlValue, TableDescriptor,
};

/// Top level of a schema file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    /// Declared tables, in registration order.
    pub tables: Vec<TableSpec>,
}

/// A table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    #[serde(default)]
    pub aka: Vec<String>,
    #[serde(default = "default_true")]
    pub evolve: bool,
}

/// A column entry. Columns are nullable unless stated otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub default: Option<SqlValue>,
    #[serde(default)]
    pub references: Option<ForeignKeyRef>,
    #[serde(default)]
    pub fake: bool,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub aka: Vec<String>,
}

/// A multi-column index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexSpec {
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

fn default_true() -> bool {
    true
}

impl From<&ColumnSpec> for ColumnDescriptor {
    fn from(spec: &ColumnSpec) -> Self {
        let mut column = ColumnDescriptor::new(&spec.name, spec.sql_type.clone());
        column.nullable = spec.nullable;
        if spec.primary_key {
            column = column.primary_key();
        }
        if spec.auto_increment {
            column = column.auto_increment();
        }
        if let Some(value) = &spec.default {
            column = column.default(value.clone());
        }
        if spec.unique {
            column = column.unique();
        }
        if let Some(target) = &spec.references {
            column = column.foreign_key(target.clone());
        }
        if spec.fake {
            column = column.fake();
        }
        if spec.index {
            column = column.index();
        }
        for alias in &spec.aka {
            column = column.aka(alias);
        }
        column
    }
}

impl From<&TableSpec> for TableDescriptor {
    fn from(spec: &TableSpec) -> Self {
        let mut table = TableDescriptor::new(&spec.name).evolve(spec.evolve);
        if let Some(schema) = &spec.schema {
            table = table.schema(schema);
        }
        for alias in &spec.aka {
            table = table.aka(alias);
        }
        for column in &spec.columns {
            table = table.column(column.into());
        }
        for index in &spec.indexes {
            let mut descriptor = IndexDescriptor::new(index.columns.iter().cloned());
            if index.unique {
                descriptor = descriptor.unique();
            }
            table = table.index(descriptor);
        }
        table
    }
}

impl SchemaFile {
    /// Parses a schema file from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Checks the declarations for mistakes the differs would not catch.
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut tables = BTreeSet::new();
        for table in &self.tables {
            if !tables.insert((table.schema.as_deref(), table.name.as_str())) {
                return Err(format!("table '{}' is declared twice", table.name));
            }
            if table.columns.is_empty() {
                return Err(format!("table '{}' has no columns", table.name));
            }

            let mut columns = BTreeSet::new();
            for column in &table.columns {
                if !columns.insert(column.name.as_str()) {
                    return Err(format!(
                        "column '{}' is declared twice in table '{}'",
                        column.name, table.name
                    ));
                }
                if column.fake && column.references.is_none() {
                    return Err(format!(
                        "column '{}.{}' is marked fake but references nothing",
                        table.name, column.name
                    ));
                }
            }

            if let Some(index) = table.indexes.iter().find(|i| i.columns.is_empty()) {
                return Err(format!(
                    "table '{}' declares an index without columns (unique: {})",
                    table.name, index.unique
                ));
            }
        }
        Ok(())
    }

    /// Builds a registry holding every declared table.
    #[must_use]
    pub fn to_registry(&self) -> Registry {
        self.tables.iter().map(TableDescriptor::from).collect()
    }
}

/// Reads, validates and registers the tables of a schema file.
pub fn load(path: impl AsRef<Path>) -> Result<Registry> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let file = SchemaFile::parse(&text)?;
    file.validate()
        .map_err(|message| EvolveError::InvalidSchema {
            path: path.to_path_buf(),
            message,
        })?;

    tracing::debug!(path = %path.display(), tables = file.tables.len(), "Loaded schema file");
    Ok(file.to_registry())
}
