//! Registry of declared tables.

use crate::schema::TableDescriptor;

/// Declared tables, in registration order.
///
/// The registry is a plain value: mutate it through `&mut` and hand it to
/// the planner by reference.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tables: Vec<TableDescriptor>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table. A table with the same schema and name is replaced
    /// in place, keeping its registration position.
    pub fn register(&mut self, table: TableDescriptor) -> &mut Self {
        match self
            .tables
            .iter_mut()
            .find(|t| t.name == table.name && t.schema == table.schema)
        {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
        self
    }

    /// Removes a table by name, returning it.
    pub fn unregister(&mut self, name: &str) -> Option<TableDescriptor> {
        let position = self.tables.iter().position(|t| t.name == name)?;
        Some(self.tables.remove(position))
    }

    /// Removes every table.
    pub fn reset(&mut self) {
        self.tables.clear();
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Iterates over tables in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter()
    }

    /// Returns the number of registered tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<TableDescriptor> for Registry {
    fn from_iter<I: IntoIterator<Item = TableDescriptor>>(iter: I) -> Self {
        let mut registry = Self::new();
        for table in iter {
            registry.register(table);
        }
        registry
    }
}
