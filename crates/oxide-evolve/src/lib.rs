//! Declarative schema evolution.
//!
//! `oxide-evolve` keeps a live database in line with tables declared in
//! code or in a schema file. There are no migration files: every run
//! introspects the database, diffs it against the declarations and
//! executes the resulting plan in one transaction.
//!
//! # Architecture
//!
//! - **Schema** - declared tables ([`TableDescriptor`]) collected in a
//!   [`Registry`]
//! - **Database** - introspection into a [`LiveSchema`] and transactional
//!   execution, one implementation per engine
//! - **Diff** - table, column and index differs producing [`Operation`]s
//! - **Dialect** - compiles types and renders operations as SQL
//! - **Planner** - orders operations and compiles them into a [`Plan`]
//! - **Executor** - runs a plan, committing or rolling back
//! - **Interactive** - preview, confirmation prompt and notices
//!
//! Renames are never guessed: a table or column is renamed only when its
//! declaration lists the old name as an alias (`aka`).
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_evolve::prelude::*;
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     TableDescriptor::new("users")
//!         .aka("people")
//!         .column(ColumnDescriptor::new("id", SqlType::BigInt).primary_key().auto_increment())
//!         .column(ColumnDescriptor::new("email", SqlType::Varchar(255)).not_null().unique())
//!         .column(ColumnDescriptor::new("active", SqlType::Boolean).not_null().default(true)),
//! );
//!
//! let db = SqliteDatabase::connect("sqlite:app.db").await?;
//! let plan = plan_changes(&db, &registry, &PlanOptions::new()).await?;
//! println!("{plan}");
//! apply(&db, &plan, false, true).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show the SQL that would run
//! oxide-evolve --schema-file schema.json plan
//!
//! # Apply after confirmation (yes / no / test)
//! oxide-evolve --schema-file schema.json apply
//!
//! # Apply and roll back, without prompting
//! oxide-evolve --schema-file schema.json apply --test
//! ```

pub mod config;
pub mod database;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod executor;
pub mod interactive;
pub mod live;
pub mod operations;
pub mod planner;
pub mod registry;
pub mod schema;
pub mod types;

use std::io;
use std::time::Duration;

pub use database::{Database, Transaction};
pub use error::{EvolveError, Result};
pub use executor::ApplyMode;
pub use live::LiveSchema;
pub use operations::{Operation, Statement};
pub use planner::{plan_changes, Plan, PlanOptions, Planner};
pub use registry::Registry;
pub use schema::TableDescriptor;

use interactive::{Outcome, Response};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{load as load_schema_file, SchemaFile};
    pub use crate::database::{
        connect, Connection, Database, MySqlDatabase, PostgresDatabase, SqliteDatabase,
    };
    pub use crate::dialect::{Dialect, DialectKind};
    pub use crate::error::{EvolveError, Result};
    pub use crate::executor::ApplyMode;
    pub use crate::operations::{Operation, Statement};
    pub use crate::planner::{plan_changes, Plan, PlanOptions};
    pub use crate::registry::Registry;
    pub use crate::schema::{
        ColumnDescriptor, DefaultValue, ForeignKeyAction, ForeignKeyRef, IndexDescriptor,
        SqlType, SqlValue, TableDescriptor,
    };
    pub use crate::{apply, evolve};
}

/// Applies a plan.
///
/// Without `interactive` the plan runs silently and `commit` picks between
/// committing and validating. With `interactive` the plan is shown first
/// and the answer to the prompt decides: "yes" commits, "test" validates
/// and "no" exits the process with status 1.
pub async fn apply<D: Database>(db: &D, plan: &Plan, interactive: bool, commit: bool) -> Result<()> {
    if plan.is_empty() {
        if interactive {
            println!("Nothing to do... Your database is up to date!");
        }
        return Ok(());
    }
    if !interactive {
        return executor::execute(db, plan, ApplyMode::from_commit(commit)).await;
    }

    let mut out = io::stdout();
    let response = {
        let mut input = io::stdin().lock();
        interactive::confirm(&mut input, &mut out, plan, db.dialect())?
    };
    let mode = match response {
        Response::Yes => ApplyMode::Commit,
        Response::Test => ApplyMode::Validate,
        Response::No => std::process::exit(1),
    };
    interactive::countdown(&mut out, Duration::from_secs(1)).await?;
    println!();

    let result = executor::execute_with(db, plan, mode, |statement| {
        // Output errors must not interrupt a running transaction.
        let _ = interactive::echo(&mut io::stdout(), &statement.to_string());
    })
    .await;

    match &result {
        Ok(()) if mode == ApplyMode::Commit => interactive::notice(&mut out, Outcome::Committed)?,
        Ok(()) => interactive::notice(&mut out, Outcome::Validated)?,
        Err(EvolveError::ExecutionFailure { .. }) => interactive::notice(&mut out, Outcome::Failed)?,
        Err(_) => {}
    }
    result
}

/// Plans the changes for `registry` and applies them, committing unless
/// the interactive prompt says otherwise.
pub async fn evolve<D: Database>(
    db: &D,
    registry: &Registry,
    options: &PlanOptions,
    interactive: bool,
) -> Result<()> {
    let plan = plan_changes(db, registry, options).await?;
    apply(db, &plan, interactive, true).await
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            TableDescriptor::new("users")
                .column(ColumnDescriptor::new("id", SqlType::Integer).primary_key())
                .column(ColumnDescriptor::new("name", SqlType::Text).not_null().default("anon")),
        );
        registry
    }

    #[tokio::test]
    async fn test_evolve_non_interactive() {
        let db = SqliteDatabase::connect("sqlite::memory:").await.unwrap();
        evolve(&db, &registry(), &PlanOptions::new(), false)
            .await
            .unwrap();

        let plan = plan_changes(&db, &registry(), &PlanOptions::new()).await.unwrap();
        assert!(plan.is_empty(), "unexpected plan:\n{plan}");
    }

    #[tokio::test]
    async fn test_apply_without_commit_validates() {
        let db = SqliteDatabase::connect("sqlite::memory:").await.unwrap();
        let plan = plan_changes(&db, &registry(), &PlanOptions::new()).await.unwrap();
        assert!(!plan.is_empty());

        apply(&db, &plan, false, false).await.unwrap();
        assert!(db.list_tables(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_empty_plan() {
        let db = SqliteDatabase::connect("sqlite::memory:").await.unwrap();
        let plan = Plan {
            dialect: DialectKind::Sqlite,
            steps: Vec::new(),
        };
        apply(&db, &plan, true, true).await.unwrap();
    }
}
