//! Column-level diff for a table that exists on both sides.

use std::collections::{BTreeMap, BTreeSet};

use crate::dialect::Dialect;
use crate::error::{EvolveError, Result};
use crate::live::{ExistingColumn, ExistingForeignKey};
use crate::operations::{ColumnDef, ForeignKeyDef, Operation};
use crate::schema::{ColumnDescriptor, TableDescriptor};
use crate::types::{self, CanonicalType};

use super::match_aliases;

const NOT_NULL_WITHOUT_DEFAULT: &str =
    "adding a not null column without a default will fail if the table is not empty";

/// Options for the column differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnDiffOptions {
    /// Compare column defaults too.
    pub diff_defaults: bool,
}

/// Column changes for one table.
#[derive(Debug, Clone, Default)]
pub struct ColumnChanges {
    /// New columns, in declaration order.
    pub adds: Vec<String>,
    /// Dropped columns, in existing ordinal order.
    pub deletes: Vec<String>,
    /// `(old, new)` renames, in declaration order.
    pub renames: Vec<(String, String)>,
    /// Every operation: adds, deletes, renames, then alterations.
    pub operations: Vec<Operation>,
}

impl ColumnChanges {
    /// Old name to new name for every renamed column.
    #[must_use]
    pub fn rename_map(&self) -> BTreeMap<String, String> {
        self.renames.iter().cloned().collect()
    }
}

/// A declared column with its canonical type resolved.
struct Declared<'a> {
    column: &'a ColumnDescriptor,
    data_type: CanonicalType,
}

/// Diffs the columns of `table` against the existing columns of its live
/// counterpart (which may have a different name when the table is renamed).
pub fn diff_columns(
    dialect: &dyn Dialect,
    table: &TableDescriptor,
    existing_columns: &[ExistingColumn],
    existing_fks: &[ExistingForeignKey],
    options: ColumnDiffOptions,
) -> Result<ColumnChanges> {
    let declared: Vec<Declared<'_>> = table
        .columns
        .iter()
        .map(|column| Declared {
            column,
            data_type: dialect.canonical_type(&column.sql_type),
        })
        .collect();
    let existing_by_name: BTreeMap<&str, &ExistingColumn> = existing_columns
        .iter()
        .map(|c| (c.name.as_str(), c))
        .collect();
    let declared_names: BTreeSet<&str> = declared.iter().map(|d| d.column.name.as_str()).collect();

    let mut delete_set: BTreeSet<String> = existing_columns
        .iter()
        .filter(|c| !declared_names.contains(c.name.as_str()))
        .map(|c| c.name.clone())
        .collect();
    let added: Vec<&Declared<'_>> = declared
        .iter()
        .filter(|d| !existing_by_name.contains_key(d.column.name.as_str()))
        .collect();

    let renames = match_aliases(
        added
            .iter()
            .map(|d| (d.column.name.as_str(), d.column.aliases.as_slice())),
        &delete_set,
        Some(&table.name),
        |new, old| {
            let new_type = declared
                .iter()
                .find(|d| d.column.name == new)
                .map(|d| &d.data_type);
            let old_type = existing_by_name
                .get(old)
                .map(|c| dialect.normalize_type(&c.data_type));
            match (new_type, old_type) {
                (Some(new_type), Some(old_type)) => types::can_convert(new_type, &old_type),
                _ => false,
            }
        },
    )?;
    for (old, _) in &renames {
        delete_set.remove(old);
    }
    let old_name_of: BTreeMap<&str, &str> = renames
        .iter()
        .map(|(old, new)| (new.as_str(), old.as_str()))
        .collect();

    let adds: Vec<&Declared<'_>> = added
        .into_iter()
        .filter(|d| !old_name_of.contains_key(d.column.name.as_str()))
        .collect();
    let deletes: Vec<String> = existing_columns
        .iter()
        .filter(|c| delete_set.contains(&c.name))
        .map(|c| c.name.clone())
        .collect();

    let mut alterations = Vec::new();
    for d in declared.iter().filter(|d| !adds.iter().any(|a| a.column.name == d.column.name)) {
        let existing_name = old_name_of
            .get(d.column.name.as_str())
            .copied()
            .unwrap_or(d.column.name.as_str());
        let Some(existing) = existing_by_name.get(existing_name) else {
            continue;
        };
        alterations.extend(alter_column(dialect, &table.name, d, existing, options)?);
    }

    let fk_by_column: BTreeMap<&str, &ExistingForeignKey> = existing_fks
        .iter()
        .map(|fk| (fk.column.as_str(), fk))
        .collect();
    for d in declared.iter().filter(|d| !adds.iter().any(|a| a.column.name == d.column.name)) {
        let column = d.column;
        let existing_name = old_name_of
            .get(column.name.as_str())
            .copied()
            .unwrap_or(column.name.as_str());
        let existing_fk = fk_by_column.get(existing_name);

        match (column.enforced_foreign_key(), existing_fk) {
            (Some(target), None) => alterations.push(Operation::AddForeignKey {
                table: table.name.clone(),
                foreign_key: ForeignKeyDef::new(&table.name, &column.name, target),
            }),
            (None, Some(fk)) if column.foreign_key.is_none() => {
                alterations.push(Operation::DropForeignKey {
                    table: table.name.clone(),
                    name: fk.name.clone(),
                });
            }
            _ => {}
        }
    }

    let mut operations = Vec::new();
    for d in &adds {
        operations.extend(add_column(dialect, &table.name, d.column));
    }
    operations.extend(deletes.iter().map(|column| Operation::DropColumn {
        table: table.name.clone(),
        column: column.clone(),
    }));
    for (old, new) in &renames {
        if let Some(column) = table.get_column(new) {
            operations.push(Operation::RenameColumn {
                table: table.name.clone(),
                old_name: old.clone(),
                column: column.into(),
            });
        }
    }
    operations.extend(alterations);

    Ok(ColumnChanges {
        adds: adds.iter().map(|d| d.column.name.clone()).collect(),
        deletes,
        renames,
        operations,
    })
}

/// Operations that add a new column. The column is added nullable and NOT
/// NULL follows a backfill, unless the dialect fills existing rows from a
/// literal default while adding a NOT NULL column.
fn add_column(dialect: &dyn Dialect, table: &str, column: &ColumnDescriptor) -> Vec<Operation> {
    let def = ColumnDef::from(column);
    let inline_not_null = !column.nullable
        && dialect.adds_not_null_columns_with_default()
        && def.default.is_some();
    let mut ops = vec![Operation::AddColumn {
        table: table.to_string(),
        column: def.clone().with_nullable(!inline_not_null),
    }];

    if let Some(target) = column.enforced_foreign_key() {
        ops.push(Operation::AddForeignKey {
            table: table.to_string(),
            foreign_key: ForeignKeyDef::new(table, &column.name, target),
        });
    }

    if !column.nullable && !inline_not_null {
        ops.push(match &column.default {
            Some(default) => Operation::ApplyDefault {
                table: table.to_string(),
                column: def.clone(),
                value: default.resolve(),
            },
            None => Operation::Warning {
                message: NOT_NULL_WITHOUT_DEFAULT.to_string(),
            },
        });
        ops.push(Operation::AddNotNull {
            table: table.to_string(),
            column: def,
        });
    }

    ops
}

/// Operations that bring an existing column in line with its declaration.
fn alter_column(
    dialect: &dyn Dialect,
    table: &str,
    declared: &Declared<'_>,
    existing: &ExistingColumn,
    options: ColumnDiffOptions,
) -> Result<Vec<Operation>> {
    let column = declared.column;
    let existing_type = dialect.normalize_type(&existing.data_type);
    let existing_default = types::normalize_default(existing.default.as_deref());
    let declared_default = column
        .default
        .as_ref()
        .and_then(|d| d.database_default())
        .map(|v| dialect.render_value(v));
    let declared_default = types::normalize_default(declared_default.as_deref());
    let defaults_differ = !same_default(existing_default.as_deref(), declared_default.as_deref());

    let changed = existing.nullable != column.nullable
        || existing_type != declared.data_type
        || existing.primary_key != column.primary_key
        || (options.diff_defaults && defaults_differ);
    if !changed {
        return Ok(Vec::new());
    }

    let def = ColumnDef::from(column);
    let mut ops = Vec::new();

    if existing.nullable && !column.nullable {
        if let Some(default) = &column.default {
            ops.push(Operation::ApplyDefault {
                table: table.to_string(),
                column: def.clone(),
                value: default.resolve(),
            });
        }
        ops.push(Operation::AddNotNull {
            table: table.to_string(),
            column: def.clone(),
        });
    }

    if !existing.nullable && column.nullable {
        ops.push(Operation::DropNotNull {
            table: table.to_string(),
            column: def.clone(),
        });
    }

    if existing_type != declared.data_type
        && types::can_convert(&existing_type, &declared.data_type)
    {
        ops.push(Operation::AlterType {
            table: table.to_string(),
            column: def.clone(),
        });
    }

    if options.diff_defaults {
        let database_default = column.default.as_ref().and_then(|d| d.database_default());
        if existing_default.is_some() && declared_default.is_none() {
            ops.push(Operation::DropDefault {
                table: table.to_string(),
                column: column.name.clone(),
            });
        } else if let (true, Some(value)) = (defaults_differ, database_default) {
            ops.push(Operation::SetDefault {
                table: table.to_string(),
                column: column.name.clone(),
                value: value.clone(),
            });
        }
    }

    if ops.is_empty() && !existing_type.is_array() {
        return Err(EvolveError::UnrepresentableChange {
            table: table.to_string(),
            column: column.name.clone(),
            detail: format!(
                "{} into {}",
                describe_existing(existing, &existing_type),
                describe_declared(declared, &def)
            ),
        });
    }

    Ok(ops)
}

fn same_default(existing: Option<&str>, declared: Option<&str>) -> bool {
    match (existing, declared) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

fn describe_existing(column: &ExistingColumn, data_type: &CanonicalType) -> String {
    format!(
        "{} {}{}{}",
        column.name,
        data_type,
        if column.nullable { " null" } else { " not null" },
        if column.primary_key { " primary key" } else { "" }
    )
}

fn describe_declared(declared: &Declared<'_>, def: &ColumnDef) -> String {
    format!(
        "{} {}{}{}",
        def.name,
        declared.data_type,
        if def.nullable { " null" } else { " not null" },
        if def.primary_key { " primary key" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::schema::{DefaultValue, SqlType, SqlValue};

    fn existing(name: &str, data_type: &str) -> ExistingColumn {
        ExistingColumn::new("users", name, data_type)
    }

    fn users(columns: Vec<ColumnDescriptor>) -> TableDescriptor {
        columns.into_iter().fold(
            TableDescriptor::new("users")
                .column(ColumnDescriptor::new("id", SqlType::Integer).primary_key()),
            TableDescriptor::column,
        )
    }

    fn diff(table: &TableDescriptor, columns: &[ExistingColumn]) -> Result<ColumnChanges> {
        let mut all = vec![existing("id", "integer").primary_key()];
        all.extend_from_slice(columns);
        diff_columns(
            &PostgresDialect,
            table,
            &all,
            &[],
            ColumnDiffOptions::default(),
        )
    }

    #[test]
    fn test_no_changes() {
        let table = users(vec![ColumnDescriptor::new("name", SqlType::Varchar(255))]);
        let changes = diff(&table, &[existing("name", "character varying")]).unwrap();
        assert!(changes.operations.is_empty());
    }

    #[test]
    fn test_add_not_null_column_backfills_first() {
        let table = users(vec![ColumnDescriptor::new("status", SqlType::Text)
            .not_null()
            .default("x")]);
        let changes = diff(&table, &[]).unwrap();

        assert_eq!(changes.adds, vec!["status"]);
        let ops = &changes.operations;
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], Operation::AddColumn { column, .. } if column.name == "status"));
        assert!(matches!(&ops[1], Operation::ApplyDefault { value, .. }
            if *value == SqlValue::from("x")));
        assert!(matches!(&ops[2], Operation::AddNotNull { column, .. } if !column.nullable));
    }

    #[test]
    fn test_sqlite_adds_not_null_column_in_one_step() {
        let table = users(vec![ColumnDescriptor::new("status", SqlType::Text)
            .not_null()
            .default("x")]);
        let ops = diff_columns(
            &SqliteDialect,
            &table,
            &[existing("id", "INTEGER").primary_key()],
            &[],
            ColumnDiffOptions::default(),
        )
        .unwrap()
        .operations;

        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Operation::AddColumn { column, .. }
            if !column.nullable && column.default == Some(SqlValue::from("x"))));
    }

    #[test]
    fn test_add_not_null_column_without_default_warns() {
        let table = users(vec![ColumnDescriptor::new("status", SqlType::Text).not_null()]);
        let ops = diff(&table, &[]).unwrap().operations;

        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[1], Operation::Warning { message }
            if message == NOT_NULL_WITHOUT_DEFAULT));
    }

    #[test]
    fn test_generator_default_is_evaluated_for_backfill() {
        let table = users(vec![ColumnDescriptor::new("token", SqlType::Text)
            .not_null()
            .default(DefaultValue::generator(|| SqlValue::from("generated")))]);
        let ops = diff(&table, &[]).unwrap().operations;

        assert!(matches!(&ops[0], Operation::AddColumn { column, .. } if column.default.is_none()));
        assert!(matches!(&ops[1], Operation::ApplyDefault { value, .. }
            if *value == SqlValue::from("generated")));
    }

    #[test]
    fn test_new_foreign_key_column() {
        let table = users(vec![
            ColumnDescriptor::new("team_id", SqlType::Integer).references("teams", "id")
        ]);
        let ops = diff(&table, &[]).unwrap().operations;

        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[1], Operation::AddForeignKey { foreign_key, .. }
            if foreign_key.name == "fk_users_team_id_refs_teams"));
    }

    #[test]
    fn test_delete_columns_in_ordinal_order() {
        let table = users(vec![]);
        let changes = diff(&table, &[existing("zeta", "text"), existing("alpha", "text")]).unwrap();

        assert_eq!(changes.deletes, vec!["zeta", "alpha"]);
        assert!(matches!(&changes.operations[0], Operation::DropColumn { column, .. } if column == "zeta"));
    }

    #[test]
    fn test_rename_column_through_alias() {
        let table = users(vec![ColumnDescriptor::new("full_name", SqlType::Text).aka("name")]);
        let changes = diff(&table, &[existing("name", "text")]).unwrap();

        assert!(changes.adds.is_empty());
        assert!(changes.deletes.is_empty());
        assert_eq!(
            changes.rename_map().get("name").map(String::as_str),
            Some("full_name")
        );
        assert_eq!(changes.operations.len(), 1);
        assert!(matches!(&changes.operations[0], Operation::RenameColumn { old_name, column, .. }
            if old_name == "name" && column.name == "full_name"));
    }

    #[test]
    fn test_rename_to_array_is_not_detected() {
        let table = users(vec![ColumnDescriptor::new(
            "tags",
            SqlType::Array(Box::new(SqlType::Text)),
        )
        .aka("tag")]);
        let changes = diff(&table, &[existing("tag", "text")]).unwrap();

        assert_eq!(changes.adds, vec!["tags"]);
        assert_eq!(changes.deletes, vec!["tag"]);
    }

    #[test]
    fn test_ambiguous_column_alias() {
        let table = users(vec![
            ColumnDescriptor::new("a", SqlType::Text).aka("old"),
            ColumnDescriptor::new("b", SqlType::Text).aka("old"),
        ]);
        let err = diff(&table, &[existing("old", "text")]).unwrap_err();
        assert!(matches!(err, EvolveError::AmbiguousAlias { table: Some(ref t), .. } if t == "users"));
    }

    #[test]
    fn test_make_existing_column_not_null() {
        let table = users(vec![ColumnDescriptor::new("email", SqlType::Text)
            .not_null()
            .default("none")]);
        let ops = diff(&table, &[existing("email", "text")]).unwrap().operations;

        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], Operation::ApplyDefault { .. }));
        assert!(matches!(&ops[1], Operation::AddNotNull { .. }));
    }

    #[test]
    fn test_drop_not_null_and_change_type() {
        let table = users(vec![ColumnDescriptor::new("age", SqlType::BigInt)]);
        let ops = diff(&table, &[existing("age", "integer").not_null()])
            .unwrap()
            .operations;

        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], Operation::DropNotNull { .. }));
        assert!(matches!(&ops[1], Operation::AlterType { column, .. }
            if column.sql_type == SqlType::BigInt));
    }

    #[test]
    fn test_array_columns_are_exempt() {
        let table = users(vec![ColumnDescriptor::new("tags", SqlType::Text)]);
        let ops = diff(&table, &[existing("tags", "ARRAY")]).unwrap().operations;
        assert!(ops.is_empty());

        let table = users(vec![ColumnDescriptor::new("tags", SqlType::Text).not_null()]);
        let ops = diff(&table, &[existing("tags", "ARRAY")]).unwrap().operations;
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Operation::AddNotNull { .. }));
    }

    #[test]
    fn test_primary_key_change_is_unrepresentable() {
        let table = users(vec![ColumnDescriptor::new("code", SqlType::Text).not_null()]);
        let code = existing("code", "text").primary_key();
        let err = diff(&table, &[code]).unwrap_err();
        assert!(matches!(err, EvolveError::UnrepresentableChange { ref column, .. } if column == "code"));
    }

    #[test]
    fn test_foreign_key_added_and_dropped() {
        let table = users(vec![
            ColumnDescriptor::new("team_id", SqlType::Integer).references("teams", "id")
        ]);
        let ops = diff(&table, &[existing("team_id", "integer")]).unwrap().operations;
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Operation::AddForeignKey { .. }));

        let table = users(vec![ColumnDescriptor::new("team_id", SqlType::Integer)]);
        let fk = ExistingForeignKey {
            table: "users".to_string(),
            column: "team_id".to_string(),
            dest_table: "teams".to_string(),
            dest_column: "id".to_string(),
            name: "users_team_id_fkey".to_string(),
        };
        let ops = diff_columns(
            &PostgresDialect,
            &table,
            &[
                existing("id", "integer").primary_key(),
                existing("team_id", "integer"),
            ],
            &[fk],
            ColumnDiffOptions::default(),
        )
        .unwrap()
        .operations;
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Operation::DropForeignKey { name, .. } if name == "users_team_id_fkey"));
    }

    #[test]
    fn test_fake_foreign_key_is_left_alone() {
        let table = users(vec![ColumnDescriptor::new("team_id", SqlType::Integer)
            .references("teams", "id")
            .fake()]);
        let ops = diff(&table, &[existing("team_id", "integer")]).unwrap().operations;
        assert!(ops.is_empty());
    }

    #[test]
    fn test_default_diffing() {
        let table = users(vec![ColumnDescriptor::new("status", SqlType::Text).default("new")]);
        let columns = [
            existing("id", "integer").primary_key(),
            existing("status", "text").default("'old'::text"),
        ];

        let ops = diff_columns(
            &PostgresDialect,
            &table,
            &columns,
            &[],
            ColumnDiffOptions::default(),
        )
        .unwrap()
        .operations;
        assert!(ops.is_empty());

        let ops = diff_columns(
            &PostgresDialect,
            &table,
            &columns,
            &[],
            ColumnDiffOptions {
                diff_defaults: true,
            },
        )
        .unwrap()
        .operations;
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Operation::SetDefault { value, .. }
            if *value == SqlValue::from("new")));

        let table = users(vec![ColumnDescriptor::new("status", SqlType::Text)]);
        let ops = diff_columns(
            &PostgresDialect,
            &table,
            &columns,
            &[],
            ColumnDiffOptions {
                diff_defaults: true,
            },
        )
        .unwrap()
        .operations;
        assert!(matches!(&ops[0], Operation::DropDefault { .. }));
    }

    #[test]
    fn test_sqlite_types_compare_through_dialect() {
        let table = users(vec![
            ColumnDescriptor::new("name", SqlType::Varchar(100)),
            ColumnDescriptor::new("active", SqlType::Boolean),
        ]);
        let changes = diff_columns(
            &SqliteDialect,
            &table,
            &[
                existing("id", "INTEGER").primary_key(),
                existing("name", "TEXT"),
                existing("active", "INTEGER"),
            ],
            &[],
            ColumnDiffOptions::default(),
        )
        .unwrap();
        assert!(changes.operations.is_empty());

        let table = users(vec![
            ColumnDescriptor::new("name", SqlType::Varchar(255)),
            ColumnDescriptor::new("active", SqlType::Boolean),
            ColumnDescriptor::new("seen", SqlType::Timestamp),
        ]);
        let changes = diff_columns(
            &SqliteDialect,
            &table,
            &[
                existing("id", "INTEGER").primary_key(),
                existing("name", "VARCHAR(255)"),
                existing("active", "BOOLEAN"),
                existing("seen", "DATETIME"),
            ],
            &[],
            ColumnDiffOptions::default(),
        )
        .unwrap();
        assert!(changes.operations.is_empty());
    }
}
