//! Index diff for one declared table.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EvolveError, Result};
use crate::live::ExistingIndex;
use crate::operations::Operation;
use crate::schema::TableDescriptor;

/// An index reduced to what is compared: columns in order and uniqueness.
type IndexKey = (Vec<String>, bool);

/// Diffs the declared indexes of `table` against its existing indexes.
///
/// `existing_primary_key` is the live primary key of the table;
/// `deleted_columns` and `renames` (old name to new name) come from the
/// column diff. Drops are emitted before creates so that an index can be
/// recreated under the same name.
pub fn diff_indexes(
    table: &TableDescriptor,
    existing: &[ExistingIndex],
    existing_primary_key: &[String],
    deleted_columns: &[String],
    renames: &BTreeMap<String, String>,
) -> Result<Vec<Operation>> {
    let declared_pk: BTreeSet<&str> = table
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.as_str())
        .collect();
    let existing_pk: BTreeSet<&str> = existing_primary_key.iter().map(String::as_str).collect();
    let is_primary_key = |columns: &[String]| {
        let set: BTreeSet<&str> = columns.iter().map(String::as_str).collect();
        (!declared_pk.is_empty() && set == declared_pk)
            || (!existing_pk.is_empty() && set == existing_pk)
    };

    let mut existing_by_key: BTreeMap<IndexKey, Vec<&str>> = BTreeMap::new();
    for index in existing {
        if is_primary_key(index.columns.as_slice())
            || index.columns.iter().any(|c| deleted_columns.contains(c))
        {
            continue;
        }
        let columns = index
            .columns
            .iter()
            .map(|c| renames.get(c).unwrap_or(c).clone())
            .collect();
        existing_by_key
            .entry((columns, index.unique))
            .or_default()
            .push(&index.name);
    }

    // One declared index per column list; unique wins.
    let mut declared: BTreeMap<Vec<String>, bool> = BTreeMap::new();
    let mut declare = |columns: Vec<String>, unique: bool| {
        *declared.entry(columns).or_default() |= unique;
    };
    for column in &table.columns {
        if column.unique || column.index {
            declare(vec![column.name.clone()], column.unique);
        }
    }
    for index in &table.indexes {
        if let Some(missing) = index.columns.iter().find(|c| table.get_column(c).is_none()) {
            return Err(EvolveError::AmbiguousIndexReference {
                table: table.name.clone(),
                columns: index.columns.join(", "),
                column: missing.clone(),
            });
        }
        declare(index.columns.clone(), index.unique);
    }
    let declared: BTreeSet<IndexKey> = declared
        .into_iter()
        .filter(|(columns, _)| !is_primary_key(columns.as_slice()))
        .collect();

    // Redundant copies of a declared index go too.
    let mut ops: Vec<Operation> = existing_by_key
        .iter()
        .flat_map(|(key, names)| {
            let keep = usize::from(declared.contains(key));
            names.iter().skip(keep)
        })
        .map(|name| Operation::DropIndex {
            name: (*name).to_string(),
            table: table.name.clone(),
        })
        .collect();

    ops.extend(
        declared
            .iter()
            .filter(|key| !existing_by_key.contains_key(*key))
            .map(|(columns, unique)| Operation::CreateIndex {
                name: index_name(&table.name, columns),
                table: table.name.clone(),
                columns: columns.clone(),
                unique: *unique,
            }),
    );

    Ok(ops)
}

/// Name for a created index: `{table}_{col1}_{col2}...`.
#[must_use]
pub fn index_name(table: &str, columns: &[String]) -> String {
    let mut name = table.to_string();
    for column in columns {
        name.push('_');
        name.push_str(column);
    }
    name
}
