//! Record fixtures for unit tests.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use driftsync_common::{DeletableRecord, Error, Record, Timestamp, Tombstone};

use futures::stream::{self, StreamExt};

use crate::fetch::{fixed_pages, ChangedFetch, PageStream, TombstoneFetch};

pub(crate) fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Person {
    pub id: u32,
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

pub(crate) fn person(id: u32, secs: i64) -> Person {
    Person { id, ts: at(secs) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Company {
    pub id: u32,
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

pub(crate) fn company(id: u32, secs: i64) -> Company {
    Company { id, ts: at(secs) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Note {
    pub id: u32,
    pub ts: Timestamp,
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

pub(crate) fn note(id: u32, secs: i64, deleted: bool) -> Note {
    Note {
        id,
        ts: at(secs),
        deleted,
    }
}

pub(crate) fn changed<C, R, F>(f: F) -> ChangedFetch<C, R>
where
    F: Fn(Arc<C>, Option<Timestamp>) -> PageStream<R> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn tombstones<C, K, F>(f: F) -> TombstoneFetch<C, K>
where
    F: Fn(Arc<C>, Timestamp) -> PageStream<Tombstone<K>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One page holding the records newer than `since`.
pub(crate) fn changed_since<R: Record>(records: Vec<R>, since: Option<Timestamp>) -> PageStream<R> {
    let fresh = records
        .into_iter()
        .filter(|r| since.map_or(true, |ts| r.ts() > ts))
        .collect();
    fixed_pages(vec![fresh])
}

/// A page sequence that fails when polled.
pub(crate) fn failing_pages<T: Send + 'static>(error: Error) -> PageStream<T> {
    stream::once(async move { Err(error) }).boxed()
}
