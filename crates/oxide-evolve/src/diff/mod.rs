//! Diff engine: compares declared descriptors with the live schema.
//!
//! Each differ is a pure function over a [`crate::live::LiveSchema`]
//! snapshot and declared descriptors, producing [`crate::operations::Operation`]s
//! in a deterministic order.

pub mod columns;
pub mod indexes;
pub mod tables;

pub use columns::{diff_columns, ColumnChanges, ColumnDiffOptions};
pub use indexes::diff_indexes;
pub use tables::{diff_tables, TableChanges};

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EvolveError, Result};

/// Matches added names to deleted names through their aliases.
///
/// `candidates` yields `(new name, aliases)` in priority order. For each
/// candidate the first alias that is in `deletes` and passes `compatible`
/// wins. Two candidates resolving to the same deleted name is an error.
/// Returns `(old, new)` pairs in candidate order.
pub(crate) fn match_aliases<'a, I, F>(
    candidates: I,
    deletes: &BTreeSet<String>,
    table: Option<&str>,
    compatible: F,
) -> Result<Vec<(String, String)>>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
    F: Fn(&str, &str) -> bool,
{
    let mut claimed: BTreeMap<&str, &str> = BTreeMap::new();
    let mut renames = Vec::new();

    for (name, aliases) in candidates {
        let Some(alias) = aliases
            .iter()
            .find(|alias| deletes.contains(alias.as_str()) && compatible(name, alias))
        else {
            continue;
        };

        if let Some(first) = claimed.get(alias.as_str()) {
            return Err(EvolveError::AmbiguousAlias {
                table: table.map(str::to_string),
                alias: alias.clone(),
                first: (*first).to_string(),
                second: name.to_string(),
            });
        }
        claimed.insert(alias, name);
        renames.push((alias.clone(), name.to_string()));
    }

    Ok(renames)
}
