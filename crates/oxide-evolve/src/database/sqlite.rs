//! SQLite introspection through the `pragma_*` table-valued functions.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;

use crate::dialect::{Dialect, DialectKind};
use crate::error::Result;
use crate::live::{ExistingColumn, ExistingForeignKey, ExistingIndex};
use crate::operations::{ForeignKeyDef, Statement};
use crate::schema::ForeignKeyRef;

use super::{bind_params, Database, Transaction};

/// A SQLite database.
///
/// SQLite has a single namespace per connection; the `schema` argument of
/// the introspection methods is ignored.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Wraps an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool for `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        // A single connection keeps `sqlite::memory:` databases coherent.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn primary_key_column(&self, table: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info(?) WHERE pk = 1")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(name,)| name))
    }
}

impl Database for SqliteDatabase {
    type Transaction = SqliteTransaction;

    fn dialect(&self) -> &'static dyn Dialect {
        DialectKind::Sqlite.dialect()
    }

    async fn list_tables(&self, _schema: Option<&str>) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn list_columns(&self, schema: Option<&str>) -> Result<Vec<ExistingColumn>> {
        let mut columns = Vec::new();
        for table in self.list_tables(schema).await? {
            let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
                "SELECT name, type, \"notnull\", dflt_value, pk \
                 FROM pragma_table_info(?) ORDER BY cid",
            )
            .bind(table.as_str())
            .fetch_all(&self.pool)
            .await?;

            columns.extend(rows.into_iter().map(
                |(name, data_type, not_null, default, pk)| ExistingColumn {
                    table: table.clone(),
                    name,
                    data_type,
                    nullable: not_null == 0 && pk == 0,
                    primary_key: pk > 0,
                    default,
                },
            ));
        }
        Ok(columns)
    }

    async fn list_indexes(&self, schema: Option<&str>) -> Result<Vec<ExistingIndex>> {
        let mut indexes = Vec::new();
        for table in self.list_tables(schema).await? {
            let list: Vec<(String, bool, String)> = sqlx::query_as(
                "SELECT name, \"unique\", origin FROM pragma_index_list(?) ORDER BY name",
            )
            .bind(table.as_str())
            .fetch_all(&self.pool)
            .await?;

            for (name, unique, origin) in list {
                if origin == "pk" {
                    continue;
                }
                let info: Vec<(Option<String>,)> =
                    sqlx::query_as("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                        .bind(name.as_str())
                        .fetch_all(&self.pool)
                        .await?;
                // Expression indexes have unnamed entries and cannot be compared.
                let Some(columns) = info.into_iter().map(|(c,)| c).collect::<Option<Vec<_>>>()
                else {
                    tracing::debug!(index = %name, "Skipping expression index");
                    continue;
                };
                indexes.push(ExistingIndex {
                    table: table.clone(),
                    name,
                    columns,
                    unique,
                });
            }
        }
        Ok(indexes)
    }

    async fn list_foreign_keys(&self, schema: Option<&str>) -> Result<Vec<ExistingForeignKey>> {
        let mut foreign_keys = Vec::new();
        for table in self.list_tables(schema).await? {
            // Multi-column constraints have several rows per id; only
            // single-column ones are tracked.
            let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
                "SELECT \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?) \
                 WHERE id IN (SELECT id FROM pragma_foreign_key_list(?) \
                              GROUP BY id HAVING COUNT(*) = 1) \
                 ORDER BY id",
            )
            .bind(table.as_str())
            .bind(table.as_str())
            .fetch_all(&self.pool)
            .await?;

            for (dest_table, column, dest_column) in rows {
                let dest_column = match dest_column {
                    Some(c) => c,
                    None => match self.primary_key_column(&dest_table).await? {
                        Some(c) => c,
                        None => continue,
                    },
                };
                // SQLite does not keep constraint names; use the name this
                // crate would have generated.
                let name =
                    ForeignKeyDef::new(&table, &column, &ForeignKeyRef::new(&dest_table, &dest_column))
                        .name;
                foreign_keys.push(ExistingForeignKey {
                    table: table.clone(),
                    column,
                    dest_table,
                    dest_column,
                    name,
                });
            }
        }
        Ok(foreign_keys)
    }

    async fn begin(&self) -> Result<SqliteTransaction> {
        Ok(SqliteTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// An open SQLite transaction.
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl Transaction for SqliteTransaction {
    async fn execute(&mut self, statement: &Statement) -> std::result::Result<(), sqlx::Error> {
        bind_params(sqlx::query(&statement.sql), &statement.params)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> std::result::Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    async fn rollback(self) -> std::result::Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}
