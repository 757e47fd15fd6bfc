//! Table-level diff: creates, renames and drops.

use std::collections::{BTreeSet, HashMap};

use crate::error::{EvolveError, Result};
use crate::live::LiveSchema;
use crate::operations::{ColumnDef, ForeignKeyDef, Operation};
use crate::schema::TableDescriptor;

use super::match_aliases;

/// Table-level changes between the declared and the live schema.
#[derive(Debug, Clone, Default)]
pub struct TableChanges<'a> {
    /// Tables to create, referenced tables first.
    pub adds: Vec<&'a TableDescriptor>,
    /// `(old, new)` renames, in registration order.
    pub renames: Vec<(String, String)>,
    /// Tables to drop, referencing tables first.
    pub deletes: Vec<String>,
}

impl TableChanges<'_> {
    /// Returns the live name of a declared table that is being renamed.
    #[must_use]
    pub fn renamed_from(&self, new_name: &str) -> Option<&str> {
        self.renames
            .iter()
            .find(|(_, new)| new == new_name)
            .map(|(old, _)| old.as_str())
    }

    /// Returns whether a declared table is created by this plan.
    #[must_use]
    pub fn is_added(&self, name: &str) -> bool {
        self.adds.iter().any(|t| t.name == name)
    }

    /// Returns whether nothing changes at the table level.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.renames.is_empty() && self.deletes.is_empty()
    }

    /// Create operations in dependency order, followed by the deferred
    /// foreign keys of the created tables.
    #[must_use]
    pub fn create_operations(&self) -> Vec<Operation> {
        let mut deferred = Vec::new();
        let mut ops: Vec<Operation> = self
            .adds
            .iter()
            .map(|table| {
                let mut foreign_keys = Vec::new();
                for column in &table.columns {
                    let Some(target) = column.enforced_foreign_key() else {
                        continue;
                    };
                    let fk = ForeignKeyDef::new(&table.name, &column.name, target);
                    if target.deferred {
                        deferred.push(Operation::AddForeignKey {
                            table: table.name.clone(),
                            foreign_key: fk,
                        });
                    } else {
                        foreign_keys.push(fk);
                    }
                }

                Operation::CreateTable {
                    table: table.name.clone(),
                    columns: table.columns.iter().map(ColumnDef::from).collect(),
                    primary_key: table.primary_key(),
                    foreign_keys,
                }
            })
            .collect();
        ops.extend(deferred);
        ops
    }

    /// Rename operations.
    #[must_use]
    pub fn rename_operations(&self) -> Vec<Operation> {
        self.renames
            .iter()
            .map(|(old, new)| Operation::RenameTable {
                old_name: old.clone(),
                new_name: new.clone(),
            })
            .collect()
    }

    /// Drop operations.
    #[must_use]
    pub fn drop_operations(&self) -> Vec<Operation> {
        self.deletes
            .iter()
            .map(|table| Operation::DropTable {
                table: table.clone(),
            })
            .collect()
    }
}

/// Computes table-level changes.
///
/// `declared` must already exclude tables that don't take part in the diff,
/// and `live` must already be filtered the same way.
pub fn diff_tables<'a>(
    live: &LiveSchema,
    declared: &[&'a TableDescriptor],
) -> Result<TableChanges<'a>> {
    let existing: BTreeSet<String> = live.tables.iter().cloned().collect();
    let declared_names: BTreeSet<&str> = declared.iter().map(|t| t.name.as_str()).collect();

    let mut deletes: BTreeSet<String> = existing
        .iter()
        .filter(|t| !declared_names.contains(t.as_str()))
        .cloned()
        .collect();
    let added: Vec<&TableDescriptor> = declared
        .iter()
        .copied()
        .filter(|t| !existing.contains(&t.name))
        .collect();

    let renames = match_aliases(
        added.iter().map(|t| (t.name.as_str(), t.aliases.as_slice())),
        &deletes,
        None,
        |_, _| true,
    )?;
    for (old, _) in &renames {
        deletes.remove(old);
    }

    let adds: Vec<&TableDescriptor> = added
        .into_iter()
        .filter(|t| !renames.iter().any(|(_, new)| *new == t.name))
        .collect();

    Ok(TableChanges {
        adds: creation_order(adds)?,
        renames,
        deletes: drop_order(live, deletes),
    })
}

/// Orders new tables so that referenced tables are created first.
fn creation_order(adds: Vec<&TableDescriptor>) -> Result<Vec<&TableDescriptor>> {
    let position: HashMap<&str, usize> = adds
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.as_str(), i))
        .collect();

    let mut edges = Vec::new();
    for (i, table) in adds.iter().enumerate() {
        for column in &table.columns {
            let Some(target) = column.enforced_foreign_key() else {
                continue;
            };
            if target.deferred || target.table == table.name {
                continue;
            }
            if let Some(&j) = position.get(target.table.as_str()) {
                edges.push((j, i));
            }
        }
    }

    let (order, remaining) = topological_order(adds.len(), &edges);
    if !remaining.is_empty() {
        return Err(EvolveError::ForeignKeyCycle(
            remaining.iter().map(|&i| adds[i].name.clone()).collect(),
        ));
    }
    Ok(order.into_iter().map(|i| adds[i]).collect())
}

/// Orders dropped tables so that a table goes before the tables it
/// references. Tables in a reference cycle keep name order at the end.
fn drop_order(live: &LiveSchema, deletes: BTreeSet<String>) -> Vec<String> {
    let names: Vec<String> = deletes.into_iter().collect();
    let position: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let mut edges = Vec::new();
    for (i, table) in names.iter().enumerate() {
        for fk in live.foreign_keys_of(table) {
            if fk.dest_table == *table {
                continue;
            }
            if let Some(&j) = position.get(fk.dest_table.as_str()) {
                edges.push((i, j));
            }
        }
    }

    let (order, remaining) = topological_order(names.len(), &edges);
    order
        .into_iter()
        .chain(remaining)
        .map(|i| names[i].clone())
        .collect()
}

/// Kahn's algorithm over `0..n` with `(before, after)` edges. Ready nodes
/// are taken lowest index first. Returns the order and the nodes left over
/// by a cycle.
fn topological_order(n: usize, edges: &[(usize, usize)]) -> (Vec<usize>, Vec<usize>) {
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(before, after) in edges {
        in_degree[after] += 1;
        dependents[before].push(after);
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dep in &dependents[next] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                ready.insert(dep);
            }
        }
    }

    let remaining = (0..n).filter(|&i| in_degree[i] > 0).collect();
    (order, remaining)
}
