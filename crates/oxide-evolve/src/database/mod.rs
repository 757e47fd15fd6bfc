//! Database access: introspection and transactional execution.
//!
//! [`Database`] is the capability the planner and executor consume. Each
//! supported engine implements it over an `sqlx` pool.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlDatabase;
pub use postgres::PostgresDatabase;
pub use sqlite::SqliteDatabase;

use sqlx::query::Query;

use crate::dialect::{Dialect, DialectKind};
use crate::error::Result;
use crate::live::{ExistingColumn, ExistingForeignKey, ExistingIndex, LiveSchema};
use crate::operations::Statement;
use crate::schema::SqlValue;

/// An open transaction statements run in.
#[allow(async_fn_in_trait)]
pub trait Transaction {
    /// Executes one statement with its parameters.
    async fn execute(&mut self, statement: &Statement) -> std::result::Result<(), sqlx::Error>;

    /// Commits the transaction.
    async fn commit(self) -> std::result::Result<(), sqlx::Error>;

    /// Rolls the transaction back.
    async fn rollback(self) -> std::result::Result<(), sqlx::Error>;
}

/// A database the reconciler can introspect and change.
///
/// `schema` selects the namespace to introspect; `None` is the
/// connection's default.
#[allow(async_fn_in_trait)]
pub trait Database {
    /// Transaction type returned by [`Database::begin`].
    type Transaction: Transaction;

    /// Dialect used to compile statements for this database.
    fn dialect(&self) -> &'static dyn Dialect;

    /// Lists table names.
    async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<String>>;

    /// Lists columns of every table, in ordinal order per table.
    async fn list_columns(&self, schema: Option<&str>) -> Result<Vec<ExistingColumn>>;

    /// Lists indexes of every table.
    async fn list_indexes(&self, schema: Option<&str>) -> Result<Vec<ExistingIndex>>;

    /// Lists single-column foreign keys of every table.
    async fn list_foreign_keys(&self, schema: Option<&str>) -> Result<Vec<ExistingForeignKey>>;

    /// Starts a transaction.
    async fn begin(&self) -> Result<Self::Transaction>;
}

/// Reads a complete snapshot of the live schema.
pub async fn snapshot<D: Database>(db: &D, schema: Option<&str>) -> Result<LiveSchema> {
    let tables = db.list_tables(schema).await?;
    let columns = db.list_columns(schema).await?;
    let indexes = db.list_indexes(schema).await?;
    let foreign_keys = db.list_foreign_keys(schema).await?;

    tracing::debug!(
        tables = tables.len(),
        columns = columns.len(),
        indexes = indexes.len(),
        foreign_keys = foreign_keys.len(),
        "Introspected live schema"
    );

    Ok(LiveSchema::from_parts(tables, columns, indexes, foreign_keys))
}

/// A connection to one of the supported databases.
#[derive(Debug, Clone)]
pub enum Connection {
    /// PostgreSQL.
    Postgres(PostgresDatabase),
    /// MySQL / MariaDB.
    MySql(MySqlDatabase),
    /// SQLite.
    Sqlite(SqliteDatabase),
}

/// Connects to the database named by `url`, picking the implementation
/// from the URL scheme.
pub async fn connect(url: &str) -> Result<Connection> {
    let connection = match DialectKind::from_url(url)? {
        DialectKind::Postgres => Connection::Postgres(PostgresDatabase::connect(url).await?),
        DialectKind::MySql => Connection::MySql(MySqlDatabase::connect(url).await?),
        DialectKind::Sqlite => Connection::Sqlite(SqliteDatabase::connect(url).await?),
    };
    tracing::debug!(dialect = %connection.kind(), "Connected");
    Ok(connection)
}

impl Connection {
    /// Returns the dialect family.
    #[must_use]
    pub fn kind(&self) -> DialectKind {
        match self {
            Self::Postgres(_) => DialectKind::Postgres,
            Self::MySql(_) => DialectKind::MySql,
            Self::Sqlite(_) => DialectKind::Sqlite,
        }
    }
}

/// Binds statement parameters in order.
fn bind_params<'q, DB>(
    mut query: Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>,
    params: &'q [SqlValue],
) -> Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>
where
    DB: sqlx::Database,
    bool: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    f64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
{
    for param in params {
        query = match param {
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}
