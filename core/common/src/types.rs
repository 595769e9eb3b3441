//! Data model shared by the store and the sync engine.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

/// Modification instant carried by every synchronized record.
pub type Timestamp = DateTime<Utc>;

/// A record type that participates in sync.
///
/// Deletions for plain records are reported out-of-band as [`Tombstone`]s.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Primary key used by the local table.
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Name of the remote entity set this record type is fetched from.
    const ENTITY_SET: &'static str;

    /// Key of this record.
    fn key(&self) -> Self::Key;

    /// Last modification time.
    fn ts(&self) -> Timestamp;
}

/// A record type whose deletions arrive in-band as soft-deleted records.
pub trait DeletableRecord: Record {
    /// Whether the remote marked this record as deleted.
    fn is_deleted(&self) -> bool;
}

/// Deletion marker for a [`Record`] whose deletions are tracked in a
/// separate remote log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone<K> {
    /// Key of the deleted record.
    pub key: K,
    /// When the deletion happened.
    pub ts: Timestamp,
}

impl<K> Tombstone<K> {
    /// Create a new tombstone.
    pub fn new(key: K, ts: Timestamp) -> Self {
        Self { key, ts }
    }
}

/// Name of a sync group.
///
/// Registrations may be indexed under any number of tags so that a group of
/// entity kinds can be synced together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    /// Create a new tag.
    ///
    /// # Errors
    /// - Returns error if the name is empty
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Tag cannot be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Tag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
