//! Per-entity-kind sync algorithm.

use async_trait::async_trait;
use std::any::TypeId;
use std::sync::Arc;
use tracing::{debug, info};

use driftsync_common::{DeletableRecord, Record, Result, Timestamp};
use driftsync_store::LocalTable;

use crate::accumulator::{DeletableAccumulator, TombstoneAccumulator, UpdateAccumulator};
use crate::fetch::{ChangedFetch, TombstoneFetch};
use crate::lock::{KindLocks, LockKey};
use crate::watermark::{decode_watermark, encode_watermark, max_timestamp, read_watermark};

/// Hands a unit its remote context once the unit holds its kind lock.
pub type ContextSource<C> = dyn Fn() -> Result<Arc<C>> + Send + Sync;

/// Synchronizes one entity kind.
#[async_trait]
pub trait SyncUnit<C: Send + Sync + 'static>: Send + Sync {
    /// Remote entity set name of the kind.
    fn entity_set(&self) -> &'static str;

    /// Type identity of the kind.
    fn kind(&self) -> TypeId;

    /// Pull and apply everything that changed since the last watermark.
    ///
    /// `context` is only called after the kind lock is taken. Returns the
    /// number of changed plus deleted items, or 0 without calling `context`
    /// if another sync of the same kind is already running.
    async fn sync_with(&self, context: &ContextSource<C>) -> Result<usize>;

    /// [`SyncUnit::sync_with`] over an already open context.
    async fn sync(&self, ctx: Arc<C>) -> Result<usize> {
        let context = move || -> Result<Arc<C>> { Ok(ctx.clone()) };
        self.sync_with(&context).await
    }
}

/// State shared by both unit variants.
struct UnitCore<R: Record> {
    table: Arc<dyn LocalTable<R>>,
    locks: Arc<KindLocks>,
    watermark_key: String,
}

impl<R: Record> UnitCore<R> {
    /// Lock, open the context, read the watermark, drain the accumulator
    /// `build` returns and apply it atomically.
    async fn run<C, A, F>(&self, context: &ContextSource<C>, build: F) -> Result<usize>
    where
        C: Send + Sync + 'static,
        A: UpdateAccumulator<R>,
        F: FnOnce(Arc<C>, Option<Timestamp>) -> A + Send,
    {
        let Some(_guard) = self.locks.try_lock(LockKey::kind::<R>()) else {
            debug!("{} sync already in progress, skipping", R::ENTITY_SET);
            return Ok(0);
        };

        let ctx = context()?;
        let watermark = read_watermark(self.table.as_ref(), &self.watermark_key)?;
        match watermark {
            Some(ts) => debug!("Syncing {} changed after {}", R::ENTITY_SET, encode_watermark(ts)),
            None => debug!("Syncing {} from scratch", R::ENTITY_SET),
        }

        let mut acc = build(ctx, watermark);
        let count = acc.get_changes().await?;
        if count == 0 {
            debug!("{} is up to date", R::ENTITY_SET);
            return Ok(0);
        }

        let key = &self.watermark_key;
        let mut advanced = watermark;
        self.table.run_atomic(&mut |writer| {
            // Re-read inside the scope: the slot may have moved since the fetch.
            let stored = match writer.get_metadata(key) {
                Some(value) => decode_watermark(&value)?,
                None => None,
            };
            advanced = max_timestamp(max_timestamp(stored, watermark), acc.apply_changes(writer)?);
            if let Some(ts) = advanced {
                writer.set_metadata(key, &encode_watermark(ts))?;
            }
            Ok(())
        })?;

        info!(
            "Synced {}: {} updated, {} deleted, watermark {}",
            R::ENTITY_SET,
            acc.updated(),
            acc.deleted(),
            advanced.map(encode_watermark).unwrap_or_default()
        );

        Ok(count)
    }
}

/// Unit for kinds whose deletions are reported by a separate tombstone feed.
pub struct TimestampedUnit<C, R: Record> {
    core: UnitCore<R>,
    changed: ChangedFetch<C, R>,
    tombstones: Option<TombstoneFetch<C, R::Key>>,
}

impl<C, R: Record> TimestampedUnit<C, R> {
    /// Create a unit over `table`.
    pub fn new(
        table: Arc<dyn LocalTable<R>>,
        locks: Arc<KindLocks>,
        watermark_key: impl Into<String>,
        changed: ChangedFetch<C, R>,
        tombstones: Option<TombstoneFetch<C, R::Key>>,
    ) -> Self {
        Self {
            core: UnitCore {
                table,
                locks,
                watermark_key: watermark_key.into(),
            },
            changed,
            tombstones,
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static, R: Record> SyncUnit<C> for TimestampedUnit<C, R> {
    fn entity_set(&self) -> &'static str {
        R::ENTITY_SET
    }

    fn kind(&self) -> TypeId {
        TypeId::of::<R>()
    }

    async fn sync_with(&self, context: &ContextSource<C>) -> Result<usize> {
        self.core
            .run(context, |ctx, watermark| {
                let changed = (self.changed)(ctx.clone(), watermark);
                // Nothing to tombstone against before the first full sync.
                let tombstones = match (watermark, &self.tombstones) {
                    (Some(ts), Some(fetch)) => Some(fetch(ctx.clone(), ts)),
                    _ => None,
                };
                TombstoneAccumulator::new(changed, tombstones)
            })
            .await
    }
}

/// Unit for kinds that report deletions in-band through a deleted flag.
pub struct DeletableUnit<C, R: DeletableRecord> {
    core: UnitCore<R>,
    changed: ChangedFetch<C, R>,
}

impl<C, R: DeletableRecord> DeletableUnit<C, R> {
    /// Create a unit over `table`.
    pub fn new(
        table: Arc<dyn LocalTable<R>>,
        locks: Arc<KindLocks>,
        watermark_key: impl Into<String>,
        changed: ChangedFetch<C, R>,
    ) -> Self {
        Self {
            core: UnitCore {
                table,
                locks,
                watermark_key: watermark_key.into(),
            },
            changed,
        }
    }
}

#[async_trait]
impl<C: Send + Sync + 'static, R: DeletableRecord> SyncUnit<C> for DeletableUnit<C, R> {
    fn entity_set(&self) -> &'static str {
        R::ENTITY_SET
    }

    fn kind(&self) -> TypeId {
        TypeId::of::<R>()
    }

    async fn sync_with(&self, context: &ContextSource<C>) -> Result<usize> {
        self.core
            .run(context, |ctx, watermark| {
                DeletableAccumulator::new((self.changed)(ctx, watermark))
            })
            .await
    }
}
