//! Error types for schema evolution.

use std::path::PathBuf;

/// Errors that can occur while planning or applying schema changes.
#[derive(Debug, thiserror::Error)]
pub enum EvolveError {
    /// No introspection/DDL strategy exists for the database.
    #[error("No migrator available for '{0}'")]
    UnsupportedDialect(String),

    /// The dialect cannot express an operation the plan needs.
    #[error("The {dialect} dialect cannot {operation}")]
    UnsupportedOperation {
        /// Dialect name.
        dialect: &'static str,
        /// Human readable description of the operation.
        operation: String,
    },

    /// A column definition difference has no matching operation.
    #[error("In table '{table}' I don't know how to change column '{column}': {detail}")]
    UnrepresentableChange {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Existing vs declared definitions.
        detail: String,
    },

    /// A declared multi-column index names a column the table doesn't declare.
    #[error("Index ({columns}) on '{table}' references column '{column}', which doesn't exist")]
    AmbiguousIndexReference {
        /// Table name.
        table: String,
        /// The declared index columns, comma separated.
        columns: String,
        /// The missing column.
        column: String,
    },

    /// Two declared entities claim the same old name through their aliases.
    #[error("Both '{first}' and '{second}' alias '{alias}'{}", .table.as_ref().map(|t| format!(" in table '{t}'")).unwrap_or_default())]
    AmbiguousAlias {
        /// Table the columns belong to (None for table aliases).
        table: Option<String>,
        /// The shared alias.
        alias: String,
        /// First claimant.
        first: String,
        /// Second claimant.
        second: String,
    },

    /// Tables created in the same plan reference each other in a cycle.
    #[error("Foreign keys between new tables form a cycle ({}); mark one reference as deferred", .0.join(", "))]
    ForeignKeyCycle(Vec<String>),

    /// A statement failed while the plan was executing.
    #[error("Failed to execute `{statement}`: {source}")]
    ExecutionFailure {
        /// The SQL that failed.
        statement: String,
        /// The database error.
        #[source]
        source: sqlx::Error,
    },

    /// Database error outside plan execution (connection, introspection).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading schema files, prompting).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a schema file.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A schema file parsed but describes an invalid schema.
    #[error("Invalid schema file '{path}': {message}")]
    InvalidSchema {
        /// Path to the schema file.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

/// Result type for schema evolution.
pub type Result<T> = std::result::Result<T, EvolveError>;
