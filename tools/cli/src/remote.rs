//! JSON fixture standing in for a paged remote service.
//!
//! Every sync run reloads the fixture file, so edits between runs show up as
//! remote changes. Records are served oldest first, `page_size` at a time,
//! with the offset of the next page as continuation token.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use driftsync_common::{Record, Result, Timestamp, Tombstone};
use driftsync_sync::{paginate_with_policy, Page, PageFetchPolicy, PageStream};

use crate::records::{Company, Note, Person};

/// Entry of the remote deletion log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedItem {
    pub entity_set: String,
    pub key: u32,
    pub ts: Timestamp,
}

/// Contents of a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub page_size: usize,
    pub people: Vec<Person>,
    pub companies: Vec<Company>,
    pub deleted_items: Vec<DeletedItem>,
    pub notes: Vec<Note>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            page_size: 50,
            people: Vec::new(),
            companies: Vec::new(),
            deleted_items: Vec::new(),
            notes: Vec::new(),
        }
    }
}

impl Fixture {
    /// Read a fixture file.
    ///
    /// # Errors
    /// - File cannot be read or is not a valid fixture
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Deletion log entries of `R` newer than `since`, oldest first.
    pub fn tombstones<R: Record<Key = u32>>(&self, since: Timestamp) -> Vec<Tombstone<u32>> {
        let mut items: Vec<_> = self
            .deleted_items
            .iter()
            .filter(|d| d.entity_set == R::ENTITY_SET && d.ts > since)
            .map(|d| Tombstone::new(d.key, d.ts))
            .collect();
        items.sort_by_key(|d| d.ts);
        items
    }
}

/// Records newer than `since`, oldest first.
fn changed_since<R: Record>(records: &[R], since: Option<Timestamp>) -> Vec<R> {
    let mut items: Vec<R> = records
        .iter()
        .filter(|r| since.map_or(true, |ts| r.ts() > ts))
        .cloned()
        .collect();
    items.sort_by_key(|r| r.ts());
    items
}

/// Remote context for one sync run.
pub struct Session {
    fixture: Fixture,
    policy: PageFetchPolicy,
}

impl Session {
    pub fn new(fixture: Fixture, policy: PageFetchPolicy) -> Self {
        Self { fixture, policy }
    }

    /// Serve `items` in pages under the fetch policy.
    fn serve<T: Clone + Send + Sync + 'static>(&self, items: Vec<T>) -> PageStream<T> {
        let items = Arc::new(items);
        let page_size = self.fixture.page_size.max(1);

        paginate_with_policy(self.policy.clone(), move |offset: Option<usize>| {
            let items = items.clone();
            async move {
                let start = offset.unwrap_or(0);
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

/// Builds sessions by reloading the fixture file.
#[derive(Debug, Clone)]
pub struct FixtureRemote {
    path: PathBuf,
    policy: PageFetchPolicy,
}

impl FixtureRemote {
    pub fn new(path: impl Into<PathBuf>, policy: PageFetchPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    /// Open a session on the current fixture contents.
    ///
    /// # Errors
    /// - Fixture cannot be loaded
    pub fn connect(&self) -> Result<Session> {
        Ok(Session::new(Fixture::load(&self.path)?, self.policy.clone()))
    }
}

pub fn changed_people(session: Arc<Session>, since: Option<Timestamp>) -> PageStream<Person> {
    session.serve(changed_since(&session.fixture.people, since))
}

pub fn deleted_people(session: Arc<Session>, since: Timestamp) -> PageStream<Tombstone<u32>> {
    session.serve(session.fixture.tombstones::<Person>(since))
}

pub fn changed_companies(session: Arc<Session>, since: Option<Timestamp>) -> PageStream<Company> {
    session.serve(changed_since(&session.fixture.companies, since))
}

pub fn deleted_companies(session: Arc<Session>, since: Timestamp) -> PageStream<Tombstone<u32>> {
    session.serve(session.fixture.tombstones::<Company>(since))
}

pub fn changed_notes(session: Arc<Session>, since: Option<Timestamp>) -> PageStream<Note> {
    session.serve(changed_since(&session.fixture.notes, since))
}
