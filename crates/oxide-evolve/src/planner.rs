//! Plan assembly.
//!
//! The [`Planner`] runs the table, column and index differs over one live
//! snapshot and concatenates their operations in execution order:
//! renames, creates, deferred foreign keys, per-table column changes,
//! per-table index changes and finally drops. Every operation is compiled
//! to a [`Statement`] before the plan is returned.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::database::{self, Database};
use crate::dialect::{Dialect, DialectKind};
use crate::diff::{self, ColumnDiffOptions};
use crate::error::Result;
use crate::live::LiveSchema;
use crate::operations::{Operation, Statement};
use crate::registry::Registry;
use crate::schema::TableDescriptor;

/// Options that shape a planning pass.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Namespace to introspect and reconcile; `None` means the connection's
    /// default schema.
    pub schema: Option<String>,
    /// Tables left alone on both sides.
    pub ignore_tables: Vec<String>,
    /// Compare column defaults too.
    pub diff_defaults: bool,
}

impl PlanOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Ignores a table.
    #[must_use]
    pub fn ignore(mut self, table: impl Into<String>) -> Self {
        self.ignore_tables.push(table.into());
        self
    }

    /// Enables default diffing.
    #[must_use]
    pub fn diff_defaults(mut self, enabled: bool) -> Self {
        self.diff_defaults = enabled;
        self
    }

    fn is_ignored(&self, table: &str) -> bool {
        self.ignore_tables.iter().any(|t| t == table)
    }

    /// Whether a declared table lives in the target namespace. Tables
    /// without a schema follow the connection default.
    fn in_namespace(&self, table: &TableDescriptor) -> bool {
        table.schema.is_none() || table.schema == self.schema
    }
}

/// One planned operation with its compiled statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// The structured operation.
    pub operation: Operation,
    /// The statement that performs it.
    pub statement: Statement,
}

/// An ordered list of steps for one dialect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    /// Dialect the statements were compiled for.
    pub dialect: DialectKind,
    /// Steps, in execution order.
    pub steps: Vec<Step>,
}

impl Plan {
    /// Returns whether there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Iterates over operations in order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.steps.iter().map(|s| &s.operation)
    }

    /// Iterates over statements in order.
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.steps.iter().map(|s| &s.statement)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in self.statements() {
            writeln!(f, "{statement};")?;
        }
        Ok(())
    }
}

/// Builds plans for one dialect.
pub struct Planner<'a> {
    dialect: &'a dyn Dialect,
    options: &'a PlanOptions,
}

impl<'a> Planner<'a> {
    /// Creates a planner.
    #[must_use]
    pub fn new(dialect: &'a dyn Dialect, options: &'a PlanOptions) -> Self {
        Self { dialect, options }
    }

    /// Plans the changes that turn `live` into the tables of `registry`.
    pub fn plan(&self, live: &LiveSchema, registry: &Registry) -> Result<Plan> {
        let excluded: Vec<&str> = registry
            .iter()
            .filter(|t| !t.evolve)
            .map(|t| t.name.as_str())
            .collect();
        let declared: Vec<&TableDescriptor> = registry
            .iter()
            .filter(|t| t.evolve && self.options.in_namespace(t))
            .filter(|t| !self.options.is_ignored(&t.name))
            .collect();
        let live = live.retain_tables(|t| !self.options.is_ignored(t) && !excluded.contains(&t));

        debug!(
            declared = declared.len(),
            existing = live.tables.len(),
            dialect = self.dialect.name(),
            "Planning schema changes"
        );

        let tables = diff::diff_tables(&live, &declared)?;
        let mut operations = tables.rename_operations();
        operations.extend(tables.create_operations());

        let column_options = ColumnDiffOptions {
            diff_defaults: self.options.diff_defaults,
        };
        let mut column_changes = Vec::with_capacity(declared.len());
        for table in &declared {
            if tables.is_added(&table.name) {
                column_changes.push(None);
                continue;
            }
            let existing = tables.renamed_from(&table.name).unwrap_or(table.name.as_str());
            let changes = diff::diff_columns(
                self.dialect,
                table,
                live.columns_of(existing),
                live.foreign_keys_of(existing),
                column_options,
            )?;

            if !self.dialect.drops_indexes_with_columns() {
                operations.extend(
                    live.indexes_of(existing)
                        .iter()
                        .filter(|i| i.columns.iter().any(|c| changes.deletes.contains(c)))
                        .map(|i| Operation::DropIndex {
                            name: i.name.clone(),
                            table: table.name.clone(),
                        }),
                );
            }
            operations.extend(changes.operations.iter().cloned());
            column_changes.push(Some(changes));
        }

        for (table, changes) in declared.iter().zip(&column_changes) {
            let ops = match changes {
                None => diff::diff_indexes(table, &[], &[], &[], &Default::default())?,
                Some(changes) => {
                    let existing = tables.renamed_from(&table.name).unwrap_or(table.name.as_str());
                    diff::diff_indexes(
                        table,
                        live.indexes_of(existing),
                        &live.primary_key_of(existing),
                        &changes.deletes,
                        &changes.rename_map(),
                    )?
                }
            };
            operations.extend(ops);
        }

        operations.extend(tables.drop_operations());

        let steps = operations
            .into_iter()
            .map(|operation| {
                let statement = self.dialect.generate_sql(&operation)?;
                Ok(Step {
                    operation,
                    statement,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(steps = steps.len(), "Planned schema changes");
        Ok(Plan {
            dialect: self.dialect.kind(),
            steps,
        })
    }
}

/// Introspects `db` and plans the changes for `registry`.
pub async fn plan_changes<D: Database>(
    db: &D,
    registry: &Registry,
    options: &PlanOptions,
) -> Result<Plan> {
    let live = database::snapshot(db, options.schema.as_deref()).await?;
    Planner::new(db.dialect(), options).plan(&live, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect, SqliteDialect};
    use crate::error::EvolveError;
    use crate::live::{ExistingColumn, ExistingForeignKey, ExistingIndex};
    use crate::schema::{ColumnDescriptor, IndexDescriptor, SqlType};

    fn id() -> ColumnDescriptor {
        ColumnDescriptor::new("id", SqlType::Integer)
            .primary_key()
            .auto_increment()
    }

    fn plan_for(live: &LiveSchema, registry: &Registry, options: &PlanOptions) -> Result<Plan> {
        Planner::new(&PostgresDialect, options).plan(live, registry)
    }

    fn sql(plan: &Plan) -> Vec<String> {
        plan.statements().map(ToString::to_string).collect()
    }

    fn users_live() -> LiveSchema {
        LiveSchema::new()
            .table(
                "users",
                vec![
                    ExistingColumn::new("users", "id", "integer")
                        .primary_key()
                        .default("nextval('users_id_seq'::regclass)"),
                    ExistingColumn::new("users", "name", "text"),
                ],
            )
            .index(ExistingIndex {
                table: "users".to_string(),
                name: "users_pkey".to_string(),
                columns: vec!["id".to_string()],
                unique: true,
            })
    }

    fn users() -> TableDescriptor {
        TableDescriptor::new("users")
            .column(id())
            .column(ColumnDescriptor::new("name", SqlType::Text))
    }

    #[test]
    fn test_up_to_date_plan_is_empty() {
        let registry: Registry = [users()].into_iter().collect();
        let plan = plan_for(&users_live(), &registry, &PlanOptions::new()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "");
    }

    #[test]
    fn test_create_tables_with_indexes() {
        let registry: Registry = [
            TableDescriptor::new("posts")
                .column(id())
                .column(ColumnDescriptor::new("author_id", SqlType::Integer).references("authors", "id"))
                .column(ColumnDescriptor::new("slug", SqlType::Varchar(64)).not_null().unique()),
            TableDescriptor::new("authors").column(id()),
        ]
        .into_iter()
        .collect();

        let plan = plan_for(&LiveSchema::new(), &registry, &PlanOptions::new()).unwrap();
        assert_eq!(
            sql(&plan),
            vec![
                "CREATE TABLE \"authors\" (\"id\" SERIAL NOT NULL PRIMARY KEY)".to_string(),
                "CREATE TABLE \"posts\" (\"id\" SERIAL NOT NULL PRIMARY KEY, \
                 \"author_id\" INTEGER, \"slug\" VARCHAR(64) NOT NULL, \
                 CONSTRAINT \"fk_posts_author_id_refs_authors\" FOREIGN KEY (\"author_id\") \
                 REFERENCES \"authors\" (\"id\"))"
                    .to_string(),
                "CREATE INDEX \"posts_author_id\" ON \"posts\" (\"author_id\")".to_string(),
                "CREATE UNIQUE INDEX \"posts_slug\" ON \"posts\" (\"slug\")".to_string(),
            ]
        );
    }

    #[test]
    fn test_add_not_null_column_order() {
        let registry: Registry = [users().column(
            ColumnDescriptor::new("status", SqlType::Text)
                .not_null()
                .default("x"),
        )]
        .into_iter()
        .collect();

        let plan = plan_for(&users_live(), &registry, &PlanOptions::new()).unwrap();
        assert_eq!(
            sql(&plan),
            vec![
                "ALTER TABLE \"users\" ADD COLUMN \"status\" TEXT DEFAULT 'x'",
                "UPDATE \"users\" SET \"status\" = CAST($1 AS TEXT) WHERE \"status\" IS NULL; ['x']",
                "ALTER TABLE \"users\" ALTER COLUMN \"status\" SET NOT NULL",
            ]
        );
    }

    #[test]
    fn test_rename_table_then_alter_columns() {
        let registry: Registry = [TableDescriptor::new("accounts")
            .aka("users")
            .column(id())
            .column(ColumnDescriptor::new("full_name", SqlType::Text).aka("name"))]
        .into_iter()
        .collect();

        let plan = plan_for(&users_live(), &registry, &PlanOptions::new()).unwrap();
        assert_eq!(
            sql(&plan),
            vec![
                "ALTER TABLE \"users\" RENAME TO \"accounts\"",
                "ALTER TABLE \"accounts\" RENAME COLUMN \"name\" TO \"full_name\"",
            ]
        );
    }

    #[test]
    fn test_integer_to_foreign_key_and_back() {
        let live = users_live().table(
            "posts",
            vec![
                ExistingColumn::new("posts", "id", "integer").primary_key(),
                ExistingColumn::new("posts", "user_id", "integer"),
            ],
        );
        let registry: Registry = [
            users(),
            TableDescriptor::new("posts")
                .column(id())
                .column(ColumnDescriptor::new("user_id", SqlType::Integer).references("users", "id")),
        ]
        .into_iter()
        .collect();

        let plan = plan_for(&live, &registry, &PlanOptions::new()).unwrap();
        assert_eq!(
            sql(&plan),
            vec![
                "ALTER TABLE \"posts\" ADD CONSTRAINT \"fk_posts_user_id_refs_users\" \
                 FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\")",
                "CREATE INDEX \"posts_user_id\" ON \"posts\" (\"user_id\")",
            ]
        );

        let live = live
            .foreign_key(ExistingForeignKey {
                table: "posts".to_string(),
                column: "user_id".to_string(),
                dest_table: "users".to_string(),
                dest_column: "id".to_string(),
                name: "fk_posts_user_id_refs_users".to_string(),
            })
            .index(ExistingIndex {
                table: "posts".to_string(),
                name: "posts_user_id".to_string(),
                columns: vec!["user_id".to_string()],
                unique: false,
            });
        let registry: Registry = [
            users(),
            TableDescriptor::new("posts")
                .column(id())
                .column(ColumnDescriptor::new("user_id", SqlType::Integer)),
        ]
        .into_iter()
        .collect();

        let plan = plan_for(&live, &registry, &PlanOptions::new()).unwrap();
        assert_eq!(
            sql(&plan),
            vec![
                "ALTER TABLE \"posts\" DROP CONSTRAINT \"fk_posts_user_id_refs_users\"",
                "DROP INDEX \"posts_user_id\"",
            ]
        );
    }

    #[test]
    fn test_mysql_integer_to_foreign_key_and_back() {
        let live = LiveSchema::new()
            .table("users", vec![ExistingColumn::new("users", "id", "int").primary_key()])
            .table(
                "posts",
                vec![
                    ExistingColumn::new("posts", "id", "int").primary_key(),
                    ExistingColumn::new("posts", "user_id", "int"),
                ],
            );
        let posts = |user_id: ColumnDescriptor| {
            let registry: Registry = [
                TableDescriptor::new("users").column(id()),
                TableDescriptor::new("posts").column(id()).column(user_id),
            ]
            .into_iter()
            .collect();
            registry
        };
        let options = PlanOptions::new();
        let planner = Planner::new(&MySqlDialect, &options);

        let registry = posts(ColumnDescriptor::new("user_id", SqlType::Integer).references("users", "id"));
        let plan = planner.plan(&live, &registry).unwrap();
        assert_eq!(
            sql(&plan),
            vec![
                "ALTER TABLE `posts` ADD CONSTRAINT `fk_posts_user_id_refs_users` \
                 FOREIGN KEY (`user_id`) REFERENCES `users` (`id`)",
                "CREATE INDEX `posts_user_id` ON `posts` (`user_id`)",
            ]
        );

        let live = live
            .foreign_key(ExistingForeignKey {
                table: "posts".to_string(),
                column: "user_id".to_string(),
                dest_table: "users".to_string(),
                dest_column: "id".to_string(),
                name: "fk_posts_user_id_refs_users".to_string(),
            })
            .index(ExistingIndex {
                table: "posts".to_string(),
                name: "posts_user_id".to_string(),
                columns: vec!["user_id".to_string()],
                unique: false,
            });
        assert!(planner.plan(&live, &registry).unwrap().is_empty());

        let registry = posts(ColumnDescriptor::new("user_id", SqlType::Integer));
        let plan = planner.plan(&live, &registry).unwrap();
        assert_eq!(
            sql(&plan),
            vec![
                "ALTER TABLE `posts` DROP FOREIGN KEY `fk_posts_user_id_refs_users`",
                "DROP INDEX `posts_user_id` ON `posts`",
            ]
        );
    }

    #[test]
    fn test_mysql_drops_multi_column_index_before_column() {
        let live = LiveSchema::new()
            .table(
                "t",
                vec![
                    ExistingColumn::new("t", "id", "int").primary_key(),
                    ExistingColumn::new("t", "a", "text"),
                    ExistingColumn::new("t", "b", "text"),
                ],
            )
            .index(ExistingIndex {
                table: "t".to_string(),
                name: "t_a_b".to_string(),
                columns: vec!["a".to_string(), "b".to_string()],
                unique: false,
            });
        let registry: Registry = [TableDescriptor::new("t")
            .column(id())
            .column(ColumnDescriptor::new("a", SqlType::Text))]
        .into_iter()
        .collect();

        let options = PlanOptions::new();
        let plan = Planner::new(&MySqlDialect, &options)
            .plan(&live, &registry)
            .unwrap();
        assert_eq!(
            sql(&plan),
            vec!["DROP INDEX `t_a_b` ON `t`", "ALTER TABLE `t` DROP COLUMN `b`"]
        );
    }

    #[test]
    fn test_drops_come_last() {
        let registry: Registry = [users().column(ColumnDescriptor::new("email", SqlType::Text).unique())]
            .into_iter()
            .collect();
        let live = users_live().table("legacy", vec![ExistingColumn::new("legacy", "id", "integer")]);

        let plan = plan_for(&live, &registry, &PlanOptions::new()).unwrap();
        let ops: Vec<&Operation> = plan.operations().collect();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], Operation::AddColumn { .. }));
        assert!(matches!(ops[1], Operation::CreateIndex { .. }));
        assert!(matches!(ops[2], Operation::DropTable { table } if table == "legacy"));
    }

    #[test]
    fn test_evolve_false_and_ignored_tables_are_untouched() {
        let registry: Registry = [
            TableDescriptor::new("users")
                .column(id())
                .column(ColumnDescriptor::new("other", SqlType::Text))
                .evolve(false),
            TableDescriptor::new("audit").column(id()).evolve(false),
        ]
        .into_iter()
        .collect();
        let live = users_live()
            .table("sessions", vec![ExistingColumn::new("sessions", "id", "text")]);

        let plan = plan_for(&live, &registry, &PlanOptions::new().ignore("sessions")).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_namespace_filters_declared_tables() {
        let registry: Registry = [
            users(),
            TableDescriptor::new("events").schema("audit").column(id()),
        ]
        .into_iter()
        .collect();

        let plan = plan_for(&users_live(), &registry, &PlanOptions::new()).unwrap();
        assert!(plan.is_empty());

        let plan = plan_for(&LiveSchema::new(), &registry, &PlanOptions::new().schema("audit")).unwrap();
        let tables: Vec<&str> = plan.operations().filter_map(Operation::table).collect();
        assert_eq!(tables, vec!["users", "events"]);
    }

    #[test]
    fn test_diff_errors_abort_planning() {
        let registry: Registry = [users().index(IndexDescriptor::new(["missing"]))]
            .into_iter()
            .collect();
        assert!(matches!(
            plan_for(&users_live(), &registry, &PlanOptions::new()),
            Err(EvolveError::AmbiguousIndexReference { .. })
        ));
    }

    #[test]
    fn test_unsupported_operation_fails_planning() {
        let registry: Registry = [TableDescriptor::new("users")
            .column(id())
            .column(ColumnDescriptor::new("name", SqlType::Text).not_null())]
        .into_iter()
        .collect();
        let live = LiveSchema::new().table(
            "users",
            vec![
                ExistingColumn::new("users", "id", "INTEGER").primary_key(),
                ExistingColumn::new("users", "name", "TEXT"),
            ],
        );

        let options = PlanOptions::new();
        let err = Planner::new(&SqliteDialect, &options)
            .plan(&live, &registry)
            .unwrap_err();
        assert!(matches!(err, EvolveError::UnsupportedOperation { dialect: "sqlite", .. }));
    }

    #[test]
    fn test_sqlite_drops_indexes_before_columns() {
        let registry: Registry = [TableDescriptor::new("users").column(id())].into_iter().collect();
        let live = LiveSchema::new()
            .table(
                "users",
                vec![
                    ExistingColumn::new("users", "id", "INTEGER").primary_key(),
                    ExistingColumn::new("users", "email", "TEXT"),
                ],
            )
            .index(ExistingIndex {
                table: "users".to_string(),
                name: "users_email".to_string(),
                columns: vec!["email".to_string()],
                unique: true,
            });

        let options = PlanOptions::new();
        let plan = Planner::new(&SqliteDialect, &options)
            .plan(&live, &registry)
            .unwrap();
        assert_eq!(
            sql(&plan),
            vec![
                "DROP INDEX \"users_email\"",
                "ALTER TABLE \"users\" DROP COLUMN \"email\"",
            ]
        );
    }

    #[test]
    fn test_plan_serializes() {
        let registry: Registry = [TableDescriptor::new("tags").column(id())].into_iter().collect();
        let plan = plan_for(&LiveSchema::new(), &registry, &PlanOptions::new()).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["dialect"], "postgres");
        assert_eq!(json["steps"][0]["operation"]["op"], "create_table");
    }
}
