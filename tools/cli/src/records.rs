//! Record types served by the fixture remote.

use serde::{Deserialize, Serialize};

use driftsync_common::{DeletableRecord, Record, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: u32,
    pub name: String,
    pub ts: Timestamp,
}

impl Record for Company {
    type Key = u32;
    const ENTITY_SET: &'static str = "Companies";

    fn key(&self) -> u32 {
        self.id
    }

    fn ts(&self) -> Timestamp {
        self.ts
    }
}

/// Notes are soft-deleted in place rather than tombstoned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: u32,
    pub body: String,
    pub ts: Timestamp,
    #[serde(default)]
    pub deleted: bool,
}

impl Record for Note {
    type Key = u32;
    const ENTITY_SET: &'static str = "Notes";

    fn key(&self) -> u32 {
        self.id
    }

    fn ts(&self) -> Timestamp {
        self.ts
    }
}

impl DeletableRecord for Note {
    fn is_deleted(&self) -> bool {
        self.deleted
    }
}
