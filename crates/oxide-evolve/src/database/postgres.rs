//! PostgreSQL introspection through `information_schema` and `pg_catalog`.

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;

use crate::dialect::{Dialect, DialectKind};
use crate::error::Result;
use crate::live::{ExistingColumn, ExistingForeignKey, ExistingIndex};
use crate::operations::Statement;

use super::{bind_params, Database, Transaction};

const LIST_TABLES_SQL: &str = r#"
SELECT table_name::text
FROM information_schema.tables
WHERE table_schema = COALESCE($1::text, current_schema())
  AND table_type = 'BASE TABLE'
ORDER BY table_name
"#;

const LIST_COLUMNS_SQL: &str = r#"
SELECT
    c.table_name::text,
    c.column_name::text,
    CASE WHEN c.data_type = 'USER-DEFINED' THEN c.udt_name::text ELSE c.data_type::text END,
    c.is_nullable = 'YES',
    EXISTS (
        SELECT 1
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON kcu.constraint_name = tc.constraint_name
         AND kcu.table_schema = tc.table_schema
         AND kcu.table_name = tc.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
          AND tc.table_schema = c.table_schema
          AND tc.table_name = c.table_name
          AND kcu.column_name = c.column_name
    ),
    c.column_default::text
FROM information_schema.columns c
WHERE c.table_schema = COALESCE($1::text, current_schema())
ORDER BY c.table_name, c.ordinal_position
"#;

// Expression indexes have attnum 0 and no matching attribute; the HAVING
// clause leaves them out.
const LIST_INDEXES_SQL: &str = r#"
SELECT
    t.relname::text,
    i.relname::text,
    ix.indisunique,
    array_agg(a.attname::text ORDER BY k.ord)
FROM pg_index ix
JOIN pg_class t ON t.oid = ix.indrelid
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
LEFT JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
WHERE n.nspname = COALESCE($1::text, current_schema())
  AND NOT ix.indisprimary
GROUP BY t.relname, i.relname, ix.indisunique
HAVING COUNT(a.attname) = COUNT(*)
ORDER BY t.relname, i.relname
"#;

const LIST_FOREIGN_KEYS_SQL: &str = r#"
SELECT
    tc.table_name::text,
    kcu.column_name::text,
    ccu.table_name::text,
    ccu.column_name::text,
    tc.constraint_name::text
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_name = tc.constraint_name
 AND kcu.table_schema = tc.table_schema
JOIN information_schema.constraint_column_usage ccu
  ON ccu.constraint_name = tc.constraint_name
 AND ccu.table_schema = tc.table_schema
WHERE tc.constraint_type = 'FOREIGN KEY'
  AND tc.table_schema = COALESCE($1::text, current_schema())
  AND (
      SELECT COUNT(*)
      FROM information_schema.key_column_usage k2
      WHERE k2.constraint_name = tc.constraint_name
        AND k2.table_schema = tc.table_schema
  ) = 1
ORDER BY tc.table_name, tc.constraint_name
"#;

/// A PostgreSQL database.
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Wraps an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool for `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(2).connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Database for PostgresDatabase {
    type Transaction = PostgresTransaction;

    fn dialect(&self) -> &'static dyn Dialect {
        DialectKind::Postgres.dialect()
    }

    async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(LIST_TABLES_SQL)
            .bind(schema)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn list_columns(&self, schema: Option<&str>) -> Result<Vec<ExistingColumn>> {
        let rows: Vec<(String, String, String, bool, bool, Option<String>)> =
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
                    nullable,
                    primary_key,
                    default,
                },
            )
            .collect())
    }

    async fn list_indexes(&self, schema: Option<&str>) -> Result<Vec<ExistingIndex>> {
        let rows: Vec<(String, String, bool, Vec<String>)> = sqlx::query_as(LIST_INDEXES_SQL)
            .bind(schema)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(table, name, unique, columns)| ExistingIndex {
                table,
                name,
                columns,
                unique,
            })
            .collect())
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

    async fn begin(&self) -> Result<PostgresTransaction> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// An open PostgreSQL transaction.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl Transaction for PostgresTransaction {
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
