//! JSON-file local store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tracing::debug;

use driftsync_common::{Error, Record, Result};

use crate::registry::TableRegistry;
use crate::table::{LocalStore, LocalTable, TableState, TableWriter};

/// On-disk layout of one table.
#[derive(Serialize, Deserialize)]
#[serde(bound = "R: Record")]
struct TableDocument<R: Record> {
    records: Vec<R>,
    metadata: BTreeMap<String, String>,
}

/// A table persisted as a single JSON document.
///
/// Commits write the whole document to a sibling temp file and rename it
/// over the original.
pub struct FileTable<R: Record> {
    path: PathBuf,
    state: RwLock<TableState<R>>,
}

impl<R: Record> FileTable<R> {
    /// Open the table stored at `path`, starting empty if the file does not
    /// exist yet.
    ///
    /// # Errors
    /// - File exists but cannot be read or parsed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let doc: TableDocument<R> = serde_json::from_str(&raw)?;
            debug!(
                "Loaded {} table from {}: {} records",
                R::ENTITY_SET,
                path.display(),
                doc.records.len()
            );
            TableState::from_parts(doc.records, doc.metadata)
        } else {
            TableState::new()
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TableState<R>>> {
        self.state
            .read()
            .map_err(|_| Error::Store(format!("{} table lock poisoned", R::ENTITY_SET)))
    }

    fn persist(&self, state: &TableState<R>) -> Result<()> {
        let (records, metadata) = state.to_parts();
        let doc = TableDocument { records, metadata };
        let json = serde_json::to_string_pretty(&doc)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl<R: Record> LocalTable<R> for FileTable<R> {
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
        self.persist(&staged)?;
        *state = staged;
        Ok(())
    }
}

/// Local store keeping each table in `<root>/<entity set>.json`.
pub struct FileStore {
    root: PathBuf,
    tables: TableRegistry,
}

impl FileStore {
    /// Create a store rooted at `root`.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Directory cannot be created
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root)?;
        }

        Ok(Self {
            root,
            tables: TableRegistry::new(),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document backing the table for `R`.
    ///
    /// # Errors
    /// - Entity set name is empty or contains path separators
    pub fn table_path<R: Record>(&self) -> Result<PathBuf> {
        let name = R::ENTITY_SET;
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(Error::InvalidInput(format!(
                "Entity set name cannot be used as a file name: {:?}",
                name
            )));
        }
        Ok(self.root.join(format!("{}.json", name)))
    }

    /// Get the concrete table for `R`.
    pub fn file_table<R: Record>(&self) -> Result<Arc<FileTable<R>>> {
        let path = self.table_path::<R>()?;
        self.tables.get_or_open(|| FileTable::<R>::open(path))
    }
}

impl LocalStore for FileStore {
    fn table<R: Record>(&self) -> Result<Arc<dyn LocalTable<R>>> {
        let table: Arc<dyn LocalTable<R>> = self.file_table::<R>()?;
        Ok(table)
    }
}
