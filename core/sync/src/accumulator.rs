//! Update accumulators: drain fetched pages into memory, then apply them.
//!
//! Draining happens entirely before any local write, so a failed page fetch
//! never leaves a partially applied batch behind.

use async_trait::async_trait;
use futures::TryStreamExt;
use std::collections::HashMap;

use driftsync_common::{DeletableRecord, Record, Result, Timestamp, Tombstone};
use driftsync_store::TableWriter;

use crate::fetch::PageStream;
use crate::watermark::{latest, max_timestamp};

/// Collects one sync's worth of remote changes and applies them.
#[async_trait]
pub trait UpdateAccumulator<R: Record>: Send {
    /// Fetch every page of every sequence, in source order.
    ///
    /// Returns the total number of changed and deleted items.
    async fn get_changes(&mut self) -> Result<usize>;

    /// Write the collected batches through `writer`, deletions first.
    ///
    /// Returns the latest timestamp among everything collected, or `None`
    /// if both batches are empty.
    fn apply_changes(&self, writer: &mut dyn TableWriter<R>) -> Result<Option<Timestamp>>;

    /// Number of collected changed records.
    fn updated(&self) -> usize;

    /// Number of collected deletions.
    fn deleted(&self) -> usize;
}

async fn drain<T: Send>(pages: Option<PageStream<T>>, into: &mut Vec<T>) -> Result<()> {
    if let Some(mut pages) = pages {
        while let Some(page) = pages.try_next().await? {
            into.extend(page);
        }
    }
    Ok(())
}

/// Drop updates that a deletion of the same key at the same time or later
/// has superseded.
fn surviving_updates<R: Record>(updates: &[R], deleted: &HashMap<R::Key, Timestamp>) -> Vec<R> {
    updates
        .iter()
        .filter(|r| deleted.get(&r.key()).map_or(true, |ts| r.ts() > *ts))
        .cloned()
        .collect()
}

fn latest_by_key<K, I>(deletions: I) -> HashMap<K, Timestamp>
where
    K: std::hash::Hash + Eq,
    I: IntoIterator<Item = (K, Timestamp)>,
{
    let mut latest_deletes: HashMap<K, Timestamp> = HashMap::new();
    for (key, ts) in deletions {
        latest_deletes
            .entry(key)
            .and_modify(|current| *current = (*current).max(ts))
            .or_insert(ts);
    }
    latest_deletes
}

/// Accumulator for records whose deletions come from a tombstone feed.
pub struct TombstoneAccumulator<R: Record> {
    changed: Option<PageStream<R>>,
    tombstones: Option<PageStream<Tombstone<R::Key>>>,
    updates: Vec<R>,
    deletes: Vec<Tombstone<R::Key>>,
}

impl<R: Record> TombstoneAccumulator<R> {
    /// Create an accumulator over a changed-record sequence and an optional
    /// tombstone sequence.
    pub fn new(
        changed: PageStream<R>,
        tombstones: Option<PageStream<Tombstone<R::Key>>>,
    ) -> Self {
        Self {
            changed: Some(changed),
            tombstones,
            updates: Vec::new(),
            deletes: Vec::new(),
        }
    }
}

#[async_trait]
impl<R: Record> UpdateAccumulator<R> for TombstoneAccumulator<R> {
    async fn get_changes(&mut self) -> Result<usize> {
        drain(self.tombstones.take(), &mut self.deletes).await?;
        drain(self.changed.take(), &mut self.updates).await?;

        Ok(self.updates.len() + self.deletes.len())
    }

    fn apply_changes(&self, writer: &mut dyn TableWriter<R>) -> Result<Option<Timestamp>> {
        let mut result = None;

        if !self.deletes.is_empty() {
            let keys: Vec<R::Key> = self.deletes.iter().map(|t| t.key.clone()).collect();
            writer.delete_by_keys(&keys)?;
            result = latest(self.deletes.iter().map(|t| t.ts));
        }

        if !self.updates.is_empty() {
            if self.deletes.is_empty() {
                writer.upsert(&self.updates)?;
            } else {
                let deleted = latest_by_key(self.deletes.iter().map(|t| (t.key.clone(), t.ts)));
                writer.upsert(&surviving_updates(&self.updates, &deleted))?;
            }
            result = max_timestamp(result, latest(self.updates.iter().map(Record::ts)));
        }

        Ok(result)
    }

    fn updated(&self) -> usize {
        self.updates.len()
    }

    fn deleted(&self) -> usize {
        self.deletes.len()
    }
}

/// Accumulator for records that carry their own deletion flag.
pub struct DeletableAccumulator<R: DeletableRecord> {
    changed: Option<PageStream<R>>,
    updates: Vec<R>,
    deletes: Vec<R>,
}

impl<R: DeletableRecord> DeletableAccumulator<R> {
    /// Create an accumulator over a changed-record sequence.
    pub fn new(changed: PageStream<R>) -> Self {
        Self {
            changed: Some(changed),
            updates: Vec::new(),
            deletes: Vec::new(),
        }
    }
}

#[async_trait]
impl<R: DeletableRecord> UpdateAccumulator<R> for DeletableAccumulator<R> {
    async fn get_changes(&mut self) -> Result<usize> {
        if let Some(mut pages) = self.changed.take() {
            while let Some(page) = pages.try_next().await? {
                for record in page {
                    if record.is_deleted() {
                        self.deletes.push(record);
                    } else {
                        self.updates.push(record);
                    }
                }
            }
        }

        Ok(self.updates.len() + self.deletes.len())
    }

    fn apply_changes(&self, writer: &mut dyn TableWriter<R>) -> Result<Option<Timestamp>> {
        let mut result = None;

        if !self.deletes.is_empty() {
            writer.delete(&self.deletes)?;
            result = latest(self.deletes.iter().map(Record::ts));
        }

        if !self.updates.is_empty() {
            if self.deletes.is_empty() {
                writer.upsert(&self.updates)?;
            } else {
                let deleted = latest_by_key(self.deletes.iter().map(|r| (r.key(), r.ts())));
                writer.upsert(&surviving_updates(&self.updates, &deleted))?;
            }
            result = max_timestamp(result, latest(self.updates.iter().map(Record::ts)));
        }

        Ok(result)
    }

    fn updated(&self) -> usize {
        self.updates.len()
    }

    fn deleted(&self) -> usize {
        self.deletes.len()
    }
}
