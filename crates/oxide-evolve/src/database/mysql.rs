//! MySQL / MariaDB introspection through `information_schema`.
//!
//! MySQL 8 reports several `information_schema` columns as binary strings,
//! so every text column is cast to CHAR and every flag to SIGNED.

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::MySql;

use crate::dialect::{Dialect, DialectKind};
use crate::error::Result;
use crate::live::{ExistingColumn, ExistingForeignKey, ExistingIndex};
use crate::operations::Statement;

use super::{bind_params, Database, Transaction};

const LIST_TABLES_SQL: &str = r#"
SELECT CAST(table_name AS CHAR)
FROM information_schema.tables
WHERE table_schema = COALESCE(?, DATABASE())
  AND table_type = 'BASE TABLE'
ORDER BY table_name
"#;

const LIST_COLUMNS_SQL: &str = r#"
SELECT
    CAST(table_name AS CHAR),
    CAST(column_name AS CHAR),
    CAST(data_type AS CHAR),
    CAST(is_nullable = 'YES' AS SIGNED),
    CAST(column_key = 'PRI' AS SIGNED),
    CAST(column_default AS CHAR)
FROM information_schema.columns
WHERE table_schema = COALESCE(?, DATABASE())
ORDER BY table_name, ordinal_position
"#;

const LIST_INDEXES_SQL: &str = r#"
SELECT
    CAST(table_name AS CHAR),
    CAST(index_name AS CHAR),
    CAST(non_unique AS SIGNED),
    CAST(column_name AS CHAR)
FROM information_schema.statistics
WHERE table_schema = COALESCE(?, DATABASE())
  AND index_name <> 'PRIMARY'
ORDER BY table_name, index_name, seq_in_index
"#;

const LIST_FOREIGN_KEYS_SQL: &str = r#"
SELECT
    CAST(k.table_name AS CHAR),
    CAST(k.column_name AS CHAR),
    CAST(k.referenced_table_name AS CHAR),
    CAST(k.referenced_column_name AS CHAR),
    CAST(k.constraint_name AS CHAR)
FROM information_schema.key_column_usage k
WHERE k.table_schema = COALESCE(?, DATABASE())
  AND k.referenced_table_name IS NOT NULL
  AND (
      SELECT COUNT(*)
      FROM information_schema.key_column_usage k2
      WHERE k2.table_schema = k.table_schema
        AND k2.table_name = k.table_name
        AND k2.constraint_name = k.constraint_name
  ) = 1
ORDER BY k.table_name, k.constraint_name
"#;

/// A MySQL or MariaDB database.
#[derive(Debug, Clone)]
pub struct MySqlDatabase {
    pool: MySqlPool,
}

impl MySqlDatabase {
    /// Wraps an existing pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Opens a pool for `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new().max_connections(2).connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

impl Database for MySqlDatabase {
    type Transaction = MySqlTransaction;

    fn dialect(&self) -> &'static dyn Dialect {
        DialectKind::MySql.dialect()
    }

    async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(LIST_TABLES_SQL)
            .bind(schema)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn list_columns(&self, schema: Option<&str>) -> Result<Vec<ExistingColumn>> {
        let rows: Vec<(String, String, String, i64, i64, Option<String>)> =
            sqlx::query_as(LIST_COLUMNS_SQL)
                .bind(schema)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(
                |(table, name, data_type, nullable, primary_key, default)| ExistingColumn {
                    table,
                    name,
                    data_type,
                    nullable: nullable != 0,
                    primary_key: primary_key != 0,
                    default,
                },
            )
            .collect())
    }

    async fn list_indexes(&self, schema: Option<&str>) -> Result<Vec<ExistingIndex>> {
        let rows: Vec<(String, String, i64, Option<String>)> = sqlx::query_as(LIST_INDEXES_SQL)
            .bind(schema)
            .fetch_all(&self.pool)
            .await?;

        // One row per indexed column; rows of an index are adjacent.
        let mut indexes: Vec<ExistingIndex> = Vec::new();
        let mut functional: Vec<(String, String)> = Vec::new();
        for (table, name, non_unique, column) in rows {
            let Some(column) = column else {
                functional.push((table, name));
                continue;
            };
            match indexes.last_mut() {
                Some(last) if last.table == table && last.name == name => {
                    last.columns.push(column);
                }
                _ => indexes.push(ExistingIndex {
                    table,
                    name,
                    columns: vec![column],
                    unique: non_unique == 0,
                }),
            }
        }
        indexes.retain(|i| !functional.iter().any(|(t, n)| *t == i.table && *n == i.name));
        Ok(indexes)
    }

    async fn list_foreign_keys(&self, schema: Option<&str>) -> Result<Vec<ExistingForeignKey>> {
        let rows: Vec<(String, String, String, String, String)> =
            sqlx::query_as(LIST_FOREIGN_KEYS_SQL)
                .bind(schema)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(
                |(table, column, dest_table, dest_column, name)| ExistingForeignKey {
                    table,
                    column,
                    dest_table,
                    dest_column,
                    name,
                },
            )
            .collect())
    }

    async fn begin(&self) -> Result<MySqlTransaction> {
        Ok(MySqlTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// An open MySQL transaction. DDL statements commit implicitly.
pub struct MySqlTransaction {
    tx: sqlx::Transaction<'static, MySql>,
}

impl Transaction for MySqlTransaction {
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
