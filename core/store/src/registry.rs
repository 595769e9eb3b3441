//! Per-type table registry shared by the store backends.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use driftsync_common::{Error, Result};

/// Registry of opened tables, keyed by table type.
///
/// Each backend stores its concrete table type here so that repeated
/// `LocalStore::table` calls hand out the same instance.
pub struct TableRegistry {
    tables: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl TableRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Get the table of type `T`, creating it with `open` on first use.
    ///
    /// # Errors
    /// - Whatever `open` returns
    pub fn get_or_open<T, F>(&self, open: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T>,
    {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| Error::Store("Table registry lock poisoned".to_string()))?;

        let id = TypeId::of::<T>();
        if let Some(existing) = tables.get(&id) {
            return existing
                .clone()
                .downcast::<T>()
                .map_err(|_| Error::Store("Table registry type mismatch".to_string()));
        }

        let table = Arc::new(open()?);
        tables.insert(id, table.clone());
        Ok(table)
    }

    /// Number of opened tables.
    pub fn len(&self) -> usize {
        self.tables.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Whether no table has been opened yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new()
    }
}
