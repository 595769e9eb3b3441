//! Fake remote and records shared by the scenario tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use driftsync_common::{DeletableRecord, Error, Record, Result, Timestamp, Tombstone};
use driftsync_store::{LocalStore, LocalTable, MemoryStore, TableWriter};
use driftsync_sync::{paginate, Page, PageStream};

pub fn t(n: i64) -> Timestamp {
    Utc.timestamp_opt(1_720_000_000 + n * 60, 0).unwrap()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
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

pub fn person(id: u32, name: &str, n: i64) -> Person {
    Person {
        id,
        name: name.to_string(),
        ts: t(n),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: u32,
    pub body: String,
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

pub fn note(id: u32, body: &str, n: i64, deleted: bool) -> Note {
    Note {
        id,
        body: body.to_string(),
        ts: t(n),
        deleted,
    }
}

/// Remote data set with offset-token paging.
pub struct Remote {
    pub page_size: usize,
    pub people: Mutex<Vec<Person>>,
    pub deleted_people: Mutex<Vec<Tombstone<u32>>>,
    pub notes: Mutex<Vec<Note>>,
    /// Fail every page at or after this offset.
    pub fail_from: Mutex<Option<usize>>,
    pub changed_calls: AtomicUsize,
    pub tombstone_calls: AtomicUsize,
}

impl Remote {
    pub fn new(page_size: usize) -> Arc<Self> {
        Arc::new(Self {
            page_size,
            people: Mutex::new(Vec::new()),
            deleted_people: Mutex::new(Vec::new()),
            notes: Mutex::new(Vec::new()),
            fail_from: Mutex::new(None),
            changed_calls: AtomicUsize::new(0),
            tombstone_calls: AtomicUsize::new(0),
        })
    }

    pub fn put_person(&self, p: Person) {
        let mut people = self.people.lock().unwrap();
        people.retain(|x| x.id != p.id);
        people.push(p);
    }

    pub fn delete_person(&self, id: u32, n: i64) {
        self.people.lock().unwrap().retain(|x| x.id != id);
        self.deleted_people
            .lock()
            .unwrap()
            .push(Tombstone::new(id, t(n)));
    }

    pub fn put_note(&self, n: Note) {
        let mut notes = self.notes.lock().unwrap();
        notes.retain(|x| x.id != n.id);
        notes.push(n);
    }

    fn pages<T: Clone + Send + Sync + 'static>(&self, items: Vec<T>) -> PageStream<T> {
        let page_size = self.page_size;
        let fail_from = *self.fail_from.lock().unwrap();
        let items = Arc::new(items);

        paginate(move |offset: Option<usize>| {
            let items = items.clone();
            async move {
                let start = offset.unwrap_or(0);
                if fail_from.is_some_and(|at| start >= at) {
                    return Err(Error::Fetch(format!("page at offset {} unavailable", start)));
                }
                let end = (start + page_size).min(items.len());
                let page = items[start..end].to_vec();
                Ok(if end < items.len() {
                    Page::more(page, end)
                } else {
                    Page::last(page)
                })
            }
        })
    }
}

/// Per-run context handed out by the coordinator.
pub struct Session {
    pub remote: Arc<Remote>,
}

pub fn changed_people(session: Arc<Session>, since: Option<Timestamp>) -> PageStream<Person> {
    let remote = &session.remote;
    remote.changed_calls.fetch_add(1, Ordering::SeqCst);
    let mut items: Vec<Person> = remote
        .people
        .lock()
        .unwrap()
        .iter()
        .filter(|p| since.map_or(true, |ts| p.ts > ts))
        .cloned()
        .collect();
    items.sort_by_key(|p| p.ts);
    remote.pages(items)
}

pub fn deleted_people(session: Arc<Session>, since: Timestamp) -> PageStream<Tombstone<u32>> {
    let remote = &session.remote;
    remote.tombstone_calls.fetch_add(1, Ordering::SeqCst);
    let items: Vec<Tombstone<u32>> = remote
        .deleted_people
        .lock()
        .unwrap()
        .iter()
        .filter(|d| d.ts > since)
        .cloned()
        .collect();
    remote.pages(items)
}

pub fn changed_notes(session: Arc<Session>, since: Option<Timestamp>) -> PageStream<Note> {
    let mut items: Vec<Note> = session
        .remote
        .notes
        .lock()
        .unwrap()
        .iter()
        .filter(|n| since.map_or(true, |ts| n.ts > ts))
        .cloned()
        .collect();
    items.sort_by_key(|n| n.ts);
    session.remote.pages(items)
}

/// Memory store whose commits can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_commits: Arc<AtomicBool>,
}

struct FlakyTable<R: Record> {
    inner: Arc<dyn LocalTable<R>>,
    fail_commits: Arc<AtomicBool>,
}

impl<R: Record> LocalTable<R> for FlakyTable<R> {
    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_metadata(key)
    }

    fn get(&self, key: &R::Key) -> Result<Option<R>> {
        self.inner.get(key)
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }

    fn run_atomic(
        &self,
        action: &mut dyn FnMut(&mut dyn TableWriter<R>) -> Result<()>,
    ) -> Result<()> {
        let fail = self.fail_commits.clone();
        self.inner.run_atomic(&mut |writer| {
            action(writer)?;
            if fail.load(Ordering::SeqCst) {
                return Err(Error::Store("disk full".to_string()));
            }
            Ok(())
        })
    }
}

impl LocalStore for FlakyStore {
    fn table<R: Record>(&self) -> Result<Arc<dyn LocalTable<R>>> {
        let table: Arc<dyn LocalTable<R>> = Arc::new(FlakyTable {
            inner: self.inner.table::<R>()?,
            fail_commits: self.fail_commits.clone(),
        });
        Ok(table)
    }
}
