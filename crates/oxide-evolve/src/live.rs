//! Introspected (live) schema snapshot.
//!
//! A [`LiveSchema`] is read once per planning pass and never changes while
//! the planner works on it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A column as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingColumn {
    /// Owning table.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Type as reported by the database, not yet normalized.
    pub data_type: String,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
    /// Raw default expression.
    pub default: Option<String>,
}

/// An index as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingIndex {
    /// Owning table.
    pub table: String,
    /// Index name.
    pub name: String,
    /// Indexed columns, in index order.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    pub unique: bool,
}

/// A single-column foreign key constraint as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingForeignKey {
    /// Referencing table.
    pub table: String,
    /// Referencing column.
    pub column: String,
    /// Referenced table.
    pub dest_table: String,
    /// Referenced column.
    pub dest_column: String,
    /// Constraint name.
    pub name: String,
}

/// Everything the planner knows about the live database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSchema {
    /// Table names.
    pub tables: Vec<String>,
    /// Columns per table, in ordinal order.
    pub columns: BTreeMap<String, Vec<ExistingColumn>>,
    /// Indexes per table.
    pub indexes: BTreeMap<String, Vec<ExistingIndex>>,
    /// Foreign keys per table.
    pub foreign_keys: BTreeMap<String, Vec<ExistingForeignKey>>,
}

impl LiveSchema {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups introspected entities per table. Entities of tables not in
    /// `tables` are discarded.
    #[must_use]
    pub fn from_parts(
        tables: Vec<String>,
        columns: Vec<ExistingColumn>,
        indexes: Vec<ExistingIndex>,
        foreign_keys: Vec<ExistingForeignKey>,
    ) -> Self {
        let mut live = Self {
            columns: tables.iter().map(|t| (t.clone(), Vec::new())).collect(),
            tables,
            ..Self::default()
        };
        for column in columns {
            if let Some(list) = live.columns.get_mut(&column.table) {
                list.push(column);
            }
        }
        for index in indexes {
            if !live.has_table(&index.table) {
                continue;
            }
            live.indexes.entry(index.table.clone()).or_default().push(index);
        }
        for fk in foreign_keys {
            if !live.has_table(&fk.table) {
                continue;
            }
            live.foreign_keys.entry(fk.table.clone()).or_default().push(fk);
        }
        live
    }

    /// Returns a copy without the tables `keep` rejects.
    #[must_use]
    pub fn retain_tables(&self, keep: impl Fn(&str) -> bool) -> Self {
        let tables: Vec<String> = self.tables.iter().filter(|t| keep(t.as_str())).cloned().collect();
        Self {
            columns: select(&self.columns, &tables),
            indexes: select(&self.indexes, &tables),
            foreign_keys: select(&self.foreign_keys, &tables),
            tables,
        }
    }

    /// Adds a table with its columns.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>, columns: Vec<ExistingColumn>) -> Self {
        let name = name.into();
        if !self.tables.contains(&name) {
            self.tables.push(name.clone());
        }
        self.columns.insert(name, columns);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: ExistingIndex) -> Self {
        self.indexes.entry(index.table.clone()).or_default().push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ExistingForeignKey) -> Self {
        self.foreign_keys.entry(fk.table.clone()).or_default().push(fk);
        self
    }

    /// Returns whether the table exists.
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t == name)
    }

    /// Columns of a table (empty if unknown).
    #[must_use]
    pub fn columns_of(&self, table: &str) -> &[ExistingColumn] {
        self.columns.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Indexes of a table (empty if unknown).
    #[must_use]
    pub fn indexes_of(&self, table: &str) -> &[ExistingIndex] {
        self.indexes.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Foreign keys of a table (empty if unknown).
    #[must_use]
    pub fn foreign_keys_of(&self, table: &str) -> &[ExistingForeignKey] {
        self.foreign_keys.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Primary key columns of a table, in ordinal order.
    #[must_use]
    pub fn primary_key_of(&self, table: &str) -> Vec<String> {
        self.columns_of(table)
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect()
    }
}

fn select<T: Clone>(
    map: &BTreeMap<String, Vec<T>>,
    tables: &[String],
) -> BTreeMap<String, Vec<T>> {
    map.iter()
        .filter(|(table, _)| tables.contains(table))
        .map(|(table, items)| (table.clone(), items.clone()))
        .collect()
}

impl ExistingColumn {
    /// Creates a nullable, non-key column.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
            default: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as (part of) the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Sets the raw default.
    #[must_use]
    pub fn default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}
