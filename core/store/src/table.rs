//! Local table traits.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use driftsync_common::{Record, Result};

/// Write access granted inside one atomic scope.
///
/// Nothing written through a `TableWriter` is visible to readers until the
/// enclosing [`LocalTable::run_atomic`] call returns `Ok`.
pub trait TableWriter<R: Record> {
    /// Insert or replace records by key.
    fn upsert(&mut self, records: &[R]) -> Result<()>;

    /// Remove records by key. Unknown keys are ignored.
    fn delete_by_keys(&mut self, keys: &[R::Key]) -> Result<()>;

    /// Remove whole records, using each record's own key.
    fn delete(&mut self, records: &[R]) -> Result<()>;

    /// Read a metadata slot as seen inside this scope.
    fn get_metadata(&self, key: &str) -> Option<String>;

    /// Write a metadata slot.
    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()>;
}

/// A typed table in the local store.
pub trait LocalTable<R: Record>: Send + Sync {
    /// Read a committed metadata slot.
    fn get_metadata(&self, key: &str) -> Result<Option<String>>;

    /// Read a committed record by key.
    fn get(&self, key: &R::Key) -> Result<Option<R>>;

    /// Number of committed records.
    fn count(&self) -> Result<usize>;

    /// Run `action` inside a write transaction.
    ///
    /// # Postconditions
    /// - If `action` and the commit succeed, all of its writes become
    ///   visible together
    /// - Otherwise none of them do and the error is returned
    fn run_atomic(
        &self,
        action: &mut dyn FnMut(&mut dyn TableWriter<R>) -> Result<()>,
    ) -> Result<()>;
}

/// A local store that hands out one table per record type.
pub trait LocalStore: Send + Sync + 'static {
    /// Get the table for `R`, opening it on first use.
    fn table<R: Record>(&self) -> Result<Arc<dyn LocalTable<R>>>;
}

/// In-memory contents of a table: records by key plus metadata slots.
#[derive(Debug)]
pub struct TableState<R: Record> {
    records: HashMap<R::Key, R>,
    metadata: BTreeMap<String, String>,
}

impl<R: Record> TableState<R> {
    /// Create an empty table state.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Rebuild state from a record list and metadata map.
    pub fn from_parts(records: Vec<R>, metadata: BTreeMap<String, String>) -> Self {
        let records = records.into_iter().map(|r| (r.key(), r)).collect();
        Self { records, metadata }
    }

    /// Split into a record list and metadata map.
    pub fn to_parts(&self) -> (Vec<R>, BTreeMap<String, String>) {
        (
            self.records.values().cloned().collect(),
            self.metadata.clone(),
        )
    }

    /// Look up a record.
    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.records.get(key)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Read a metadata slot.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl<R: Record> Default for TableState<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> Clone for TableState<R> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<R: Record> TableWriter<R> for TableState<R> {
    fn upsert(&mut self, records: &[R]) -> Result<()> {
        for record in records {
            self.records.insert(record.key(), record.clone());
        }
        Ok(())
    }

    fn delete_by_keys(&mut self, keys: &[R::Key]) -> Result<()> {
        for key in keys {
            self.records.remove(key);
        }
        Ok(())
    }

    fn delete(&mut self, records: &[R]) -> Result<()> {
        for record in records {
            self.records.remove(&record.key());
        }
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> Option<String> {
        self.metadata.get(key).cloned()
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use driftsync_common::Timestamp;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Person {
        pub id: u32,
        pub name: String,
        pub ts: Timestamp,
    }

    impl Record for Person {
        type Key = u32;
        const ENTITY_SET: &'static str = "People";

        fn key(&self) -> u32 {
            self.id
        }

        fn ts(&self) -> Timestamp {
            self.ts
        }
    }

    pub(crate) fn person(id: u32, name: &str) -> Person {
        Person {
            id,
            name: name.to_string(),
            ts: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id).unwrap(),
        }
    }

    #[test]
    fn test_upsert_replaces_by_key() {
        let mut state = TableState::new();
        state.upsert(&[person(1, "Ann"), person(2, "Bob")]).unwrap();
        state.upsert(&[person(1, "Anna")]).unwrap();

        assert_eq!(state.len(), 2);
        assert_eq!(state.get(&1).unwrap().name, "Anna");
    }

    #[test]
    fn test_delete_variants() {
        let mut state = TableState::new();
        state
            .upsert(&[person(1, "Ann"), person(2, "Bob"), person(3, "Cid")])
            .unwrap();

        state.delete_by_keys(&[1, 99]).unwrap();
        state.delete(&[person(3, "whatever")]).unwrap();

        assert_eq!(state.len(), 1);
        assert!(state.get(&2).is_some());
    }

    #[test]
    fn test_parts_roundtrip_keeps_metadata() {
        let mut state = TableState::new();
        state.upsert(&[person(7, "Gus")]).unwrap();
        state.set_metadata("sync.ts", "2024-01-01T00:00:07+00:00").unwrap();

        let (records, metadata) = state.to_parts();
        let restored: TableState<Person> = TableState::from_parts(records, metadata);

        assert_eq!(restored.get(&7).unwrap().name, "Gus");
        assert_eq!(restored.metadata("sync.ts"), Some("2024-01-01T00:00:07+00:00"));
    }
}
