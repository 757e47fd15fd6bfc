#![allow(dead_code)]

use oxide_evolve::prelude::*;

pub async fn database(setup: &[&str]) -> SqliteDatabase {
    let db = SqliteDatabase::connect("sqlite::memory:")
        .await
        .unwrap_or_else(|e| panic!("Failed to open in-memory database: {e}"));
    for sql in setup {
        execute(&db, sql).await;
    }
    db
}

pub async fn execute(db: &SqliteDatabase, sql: &str) {
    sqlx::query(sql)
        .execute(db.pool())
        .await
        .unwrap_or_else(|e| panic!("Failed to execute: {sql}\nError: {e}"));
}

pub async fn count(db: &SqliteDatabase, table: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM \"{table}\""))
        .fetch_one(db.pool())
        .await
        .unwrap_or_else(|e| panic!("Failed to count rows of {table}: {e}"));
    n
}

pub async fn tables(db: &SqliteDatabase) -> Vec<String> {
    db.list_tables(None).await.unwrap()
}

pub async fn plan(db: &SqliteDatabase, registry: &Registry) -> Plan {
    plan_changes(db, registry, &PlanOptions::new())
        .await
        .unwrap_or_else(|e| panic!("Failed to plan: {e}"))
}

pub fn registry(tables: Vec<TableDescriptor>) -> Registry {
    tables.into_iter().collect()
}

/// Applies the plan for `registry`, then checks that nothing is left to do.
pub async fn evolve_and_settle(db: &SqliteDatabase, registry: &Registry) -> Plan {
    let first = plan(db, registry).await;
    apply(db, &first, false, true)
        .await
        .unwrap_or_else(|e| panic!("Failed to apply:\n{first}\nError: {e}"));
    let second = plan(db, registry).await;
    assert!(second.is_empty(), "Plan not empty after apply:\n{second}");
    first
}
