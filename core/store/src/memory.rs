//! In-memory local store.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use driftsync_common::{Error, Record, Result};

use crate::registry::TableRegistry;
use crate::table::{LocalStore, LocalTable, TableState, TableWriter};

/// In-memory table.
///
/// An atomic scope works on a copy of the table and swaps it in only when
/// the action succeeds, so a failing scope leaves no trace.
pub struct MemoryTable<R: Record> {
    state: RwLock<TableState<R>>,
}

impl<R: Record> MemoryTable<R> {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(TableState::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TableState<R>>> {
        self.state
            .read()
            .map_err(|_| Error::Store(format!("{} table lock poisoned", R::ENTITY_SET)))
    }

    /// Snapshot of all committed records.
    pub fn records(&self) -> Result<Vec<R>> {
        Ok(self.read()?.to_parts().0)
    }
}

impl<R: Record> Default for MemoryTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> LocalTable<R> for MemoryTable<R> {
    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.metadata(key).map(str::to_string))
    }

    fn get(&self, key: &R::Key) -> Result<Option<R>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    fn run_atomic(
        &self,
        action: &mut dyn FnMut(&mut dyn TableWriter<R>) -> Result<()>,
    ) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::Store(format!("{} table lock poisoned", R::ENTITY_SET)))?;

        let mut staged = state.clone();
        action(&mut staged)?;
        *state = staged;
        Ok(())
    }
}

/// In-memory local store.
///
/// Useful for testing and for embedders that persist elsewhere. All data is
/// lost on drop.
pub struct MemoryStore {
    tables: TableRegistry,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            tables: TableRegistry::new(),
        }
    }

    /// Get the concrete table for `R`.
    pub fn memory_table<R: Record>(&self) -> Result<Arc<MemoryTable<R>>> {
        self.tables.get_or_open(|| Ok(MemoryTable::<R>::new()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for MemoryStore {
    fn table<R: Record>(&self) -> Result<Arc<dyn LocalTable<R>>> {
        let table: Arc<dyn LocalTable<R>> = self.memory_table::<R>()?;
        Ok(table)
    }
}
