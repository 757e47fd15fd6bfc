//! Plan execution.
//!
//! A plan runs inside one transaction. Either every statement is applied
//! and committed, or the transaction is rolled back and nothing persists.
//! MySQL commits DDL implicitly, so there the guarantee only covers the
//! data statements.

use tracing::{debug, info, warn};

use crate::database::{Database, Transaction};
use crate::error::{EvolveError, Result};
use crate::operations::Statement;
use crate::planner::Plan;

/// What to do with the transaction once every statement succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    /// Keep the changes.
    #[default]
    Commit,
    /// Roll back after running everything.
    Validate,
}

impl ApplyMode {
    /// Returns the mode for a `commit` flag.
    #[must_use]
    pub fn from_commit(commit: bool) -> Self {
        if commit {
            Self::Commit
        } else {
            Self::Validate
        }
    }
}

/// Executes `plan` against `db`.
pub async fn execute<D: Database>(db: &D, plan: &Plan, mode: ApplyMode) -> Result<()> {
    execute_with(db, plan, mode, |_| {}).await
}

/// Executes `plan` against `db`, calling `on_statement` before each
/// statement runs.
pub async fn execute_with<D, F>(db: &D, plan: &Plan, mode: ApplyMode, mut on_statement: F) -> Result<()>
where
    D: Database,
    F: FnMut(&Statement),
{
    if plan.is_empty() {
        debug!("Plan is empty, nothing to execute");
        return Ok(());
    }

    let dialect = db.dialect();
    if mode == ApplyMode::Validate && !dialect.supports_transactional_ddl() {
        return Err(EvolveError::UnsupportedOperation {
            dialect: dialect.name(),
            operation: "validate changes without applying them".to_string(),
        });
    }

    info!(steps = plan.len(), dialect = dialect.name(), ?mode, "Executing plan");
    let mut tx = db.begin().await?;

    for statement in plan.statements() {
        on_statement(statement);
        if statement.is_comment() {
            warn!("{}", statement.sql.trim_start_matches("-- "));
            continue;
        }
        debug!(sql = %statement, "Executing statement");
        if let Err(source) = tx.execute(statement).await {
            warn!(sql = %statement, error = %source, "Statement failed, rolling back");
            if let Err(error) = tx.rollback().await {
                warn!(error = %error, "Rollback failed");
            }
            return Err(EvolveError::ExecutionFailure {
                statement: statement.to_string(),
                source,
            });
        }
    }

    match mode {
        ApplyMode::Commit => {
            tx.commit().await?;
            info!("Changes committed");
        }
        ApplyMode::Validate => {
            tx.rollback().await?;
            info!("Validation succeeded, changes rolled back");
        }
    }
    Ok(())
}
