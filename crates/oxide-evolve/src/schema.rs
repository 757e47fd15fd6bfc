//! Declared schema descriptors.
//!
//! These types describe the tables an application wants to exist. They are
//! built with a builder API (or loaded from a schema file, see
//! [`crate::config`]) and registered into a [`crate::registry::Registry`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Semantic column types understood by every dialect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInt,
    /// Small integer (16-bit).
    SmallInt,
    /// Unbounded text.
    Text,
    /// Variable-length character string.
    Varchar(usize),
    /// Fixed-length character string.
    Char(usize),
    /// Boolean.
    Boolean,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Timestamp without time zone.
    Timestamp,
    /// Timestamp with time zone.
    TimestampTz,
    /// Floating point (single precision).
    Real,
    /// Floating point (double precision).
    Double,
    /// Decimal with precision and scale.
    Decimal(u8, u8),
    /// Binary large object.
    Blob,
    /// JSON document.
    Json,
    /// UUID.
    Uuid,
    /// Array of another type.
    Array(Box<SqlType>),
}

/// A literal SQL value, used for defaults and statement parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Floating point literal.
    Float(f64),
    /// String literal.
    Text(String),
}

impl SqlValue {
    /// Renders the value as an SQL literal.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// Renders the value the way introspection reports defaults: unquoted.
    #[must_use]
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            other => other.to_sql().to_lowercase(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Default value for a declared column.
#[derive(Clone)]
pub enum DefaultValue {
    /// A literal; also written into the column's DDL.
    Value(SqlValue),
    /// A zero-argument generator, evaluated once per plan for backfills.
    Generator(Arc<dyn Fn() -> SqlValue + Send + Sync>),
}

impl DefaultValue {
    /// Creates a generator default.
    pub fn generator(f: impl Fn() -> SqlValue + Send + Sync + 'static) -> Self {
        Self::Generator(Arc::new(f))
    }

    /// Produces the value to backfill existing rows with.
    #[must_use]
    pub fn resolve(&self) -> SqlValue {
        match self {
            Self::Value(v) => v.clone(),
            Self::Generator(f) => f(),
        }
    }

    /// The default as the database should store it, if it has one.
    #[must_use]
    pub fn database_default(&self) -> Option<&SqlValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Generator(_) => None,
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

impl From<SqlValue> for DefaultValue {
    fn from(value: SqlValue) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

/// Foreign key action (ON DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete to referencing rows.
    Cascade,
    /// Set the referencing column to NULL.
    SetNull,
    /// Set the referencing column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// The target of a foreign key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Added after every table of the plan exists instead of inline, which
    /// is how reference cycles between new tables are declared.
    #[serde(default)]
    pub deferred: bool,
}

impl ForeignKeyRef {
    /// Creates a reference to `table.column`.
    #[must_use]
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            on_delete: ForeignKeyAction::NoAction,
            deferred: false,
        }
    }
}

/// A declared column.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
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
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Foreign key target.
    pub foreign_key: Option<ForeignKeyRef>,
    /// A foreign-key shaped column that never gets a real constraint.
    pub fake: bool,
    /// Whether the column gets a single-column index.
    pub index: bool,
    /// Whether the column gets a single-column unique index.
    pub unique: bool,
    /// Previous names of this column.
    pub aliases: Vec<String>,
}

impl ColumnDescriptor {
    /// Creates a new nullable column.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            default: None,
            foreign_key: None,
            fake: false,
            index: false,
            unique: false,
            aliases: Vec::new(),
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false; // Primary keys are always NOT NULL
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Makes the column a foreign key to `table.column`. Foreign key
    /// columns are indexed unless they are already unique.
    #[must_use]
    pub fn references(self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key(ForeignKeyRef::new(table, column))
    }

    /// Makes the column a foreign key with a fully specified target.
    #[must_use]
    pub fn foreign_key(mut self, target: ForeignKeyRef) -> Self {
        self.foreign_key = Some(target);
        self.index = !self.unique;
        self
    }

    /// Marks a foreign key column as soft: no constraint is ever created.
    #[must_use]
    pub fn fake(mut self) -> Self {
        self.fake = true;
        self
    }

    /// Adds a single-column index.
    #[must_use]
    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    /// Adds a single-column unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.index = false;
        self
    }

    /// Adds a previous name, used to detect renames.
    #[must_use]
    pub fn aka(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Returns the constraint target when a real constraint is wanted.
    #[must_use]
    pub fn enforced_foreign_key(&self) -> Option<&ForeignKeyRef> {
        self.foreign_key.as_ref().filter(|_| !self.fake)
    }
}

/// A declared index over one or more columns. Column order matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexDescriptor {
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    pub unique: bool,
}

impl IndexDescriptor {
    /// Creates a non-unique index.
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A declared table.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,
    /// Schema/namespace; `None` means the connection's default.
    pub schema: Option<String>,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDescriptor>,
    /// Table-level indexes.
    pub indexes: Vec<IndexDescriptor>,
    /// Previous names of this table.
    pub aliases: Vec<String>,
    /// `false` excludes the table from every diff.
    pub evolve: bool,
}

impl TableDescriptor {
    /// Creates an empty table descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            columns: Vec::new(),
            indexes: Vec::new(),
            aliases: Vec::new(),
            evolve: true,
        }
    }

    /// Sets the schema/namespace.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds a table-level index.
    #[must_use]
    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a previous name, used to detect renames.
    #[must_use]
    pub fn aka(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Sets whether the table takes part in schema evolution.
    #[must_use]
    pub fn evolve(mut self, evolve: bool) -> Self {
        self.evolve = evolve;
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key column names, in declaration order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect()
    }
}
