//! Sync coordinator: registry, tag groups and run lifecycle.
//!
//! A coordinator is built unsealed, takes any number of registrations, and
//! is sealed with [`SyncCoordinator::initialize`]. Only a sealed coordinator
//! syncs. Registration needs `&mut self`, syncing only `&self`, so a sealed
//! coordinator can be shared behind an `Arc` and driven concurrently.

use futures::future::join_all;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use driftsync_common::{DeletableRecord, Error, Record, Result, Tag, Timestamp, Tombstone};
use driftsync_store::LocalStore;

use crate::config::SyncConfig;
use crate::fetch::{ChangedFetch, PageStream, TombstoneFetch};
use crate::lock::{KindLocks, LockKey};
use crate::unit::{DeletableUnit, SyncUnit, TimestampedUnit};
use crate::watermark::read_watermark;

/// Creates the remote context shared by one sync run.
pub type ContextFactory<C> = Arc<dyn Fn() -> Result<C> + Send + Sync>;

/// Groups a registration is indexed under.
///
/// A registration in the default group is synced by [`SyncCoordinator::sync_kind`]
/// and by an untagged [`SyncCoordinator::sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tags {
    names: Vec<String>,
    default: bool,
}

impl Tags {
    /// Default group only.
    pub fn none() -> Self {
        Self {
            names: Vec::new(),
            default: true,
        }
    }

    /// The named groups only. An empty list means the default group.
    pub fn of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let default = names.is_empty();
        Self { names, default }
    }

    /// Also place the registration in the default group.
    pub fn with_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Named groups.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether the default group is included.
    pub fn includes_default(&self) -> bool {
        self.default
    }
}

impl Default for Tags {
    fn default() -> Self {
        Self::none()
    }
}

/// Outcome of a group sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSync {
    /// Every unit ran; total number of changed plus deleted items.
    Completed(usize),
    /// No registration carries the requested tag. Nothing was touched.
    UnknownTag,
    /// Another group sync of this coordinator is in progress.
    AlreadyRunning,
}

impl GroupSync {
    /// Count with `-1` standing in for both non-run outcomes.
    pub fn count(&self) -> i64 {
        match self {
            GroupSync::Completed(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            GroupSync::UnknownTag | GroupSync::AlreadyRunning => -1,
        }
    }
}

/// Pull-sync façade over a local store.
pub struct SyncCoordinator<C, S> {
    store: S,
    context_factory: ContextFactory<C>,
    config: SyncConfig,
    registry: HashMap<TypeId, Arc<dyn SyncUnit<C>>>,
    tags: BTreeMap<Tag, Vec<Arc<dyn SyncUnit<C>>>>,
    locks: Arc<KindLocks>,
    sealed: bool,
}

impl<C, S> SyncCoordinator<C, S>
where
    C: Send + Sync + 'static,
    S: LocalStore,
{
    /// Create an unsealed coordinator.
    pub fn new<F>(store: S, context_factory: F, config: SyncConfig) -> Self
    where
        F: Fn() -> Result<C> + Send + Sync + 'static,
    {
        Self {
            store,
            context_factory: Arc::new(context_factory),
            config,
            registry: HashMap::new(),
            tags: BTreeMap::new(),
            locks: Arc::new(KindLocks::new()),
            sealed: false,
        }
    }

    /// The local store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Register a kind whose deletions come from a tombstone feed.
    ///
    /// # Errors
    /// - `AlreadyInitialized` after [`Self::initialize`]
    /// - `InvalidInput` for an empty tag name
    /// - Store errors opening the kind's table
    pub fn register<R, F, T>(&mut self, changed: F, tombstones: T, tags: Tags) -> Result<()>
    where
        R: Record,
        F: Fn(Arc<C>, Option<Timestamp>) -> PageStream<R> + Send + Sync + 'static,
        T: Fn(Arc<C>, Timestamp) -> PageStream<Tombstone<R::Key>> + Send + Sync + 'static,
    {
        let tombstones: TombstoneFetch<C, R::Key> = Arc::new(tombstones);
        self.register_timestamped::<R>(Arc::new(changed), Some(tombstones), tags)
    }

    /// Register a timestamped kind whose deletions are never reported.
    ///
    /// # Errors
    /// Same as [`Self::register`].
    pub fn register_without_tombstones<R, F>(&mut self, changed: F, tags: Tags) -> Result<()>
    where
        R: Record,
        F: Fn(Arc<C>, Option<Timestamp>) -> PageStream<R> + Send + Sync + 'static,
    {
        self.register_timestamped::<R>(Arc::new(changed), None, tags)
    }

    /// Register a kind that reports deletions in-band.
    ///
    /// # Errors
    /// Same as [`Self::register`].
    pub fn register_deletable<R, F>(&mut self, changed: F, tags: Tags) -> Result<()>
    where
        R: DeletableRecord,
        F: Fn(Arc<C>, Option<Timestamp>) -> PageStream<R> + Send + Sync + 'static,
    {
        let tags = self.check_registration(tags)?;
        let unit = DeletableUnit::new(
            self.store.table::<R>()?,
            self.locks.clone(),
            self.config.watermark_key.clone(),
            Arc::new(changed),
        );
        self.insert_unit(Arc::new(unit), tags);
        Ok(())
    }

    fn register_timestamped<R: Record>(
        &mut self,
        changed: ChangedFetch<C, R>,
        tombstones: Option<TombstoneFetch<C, R::Key>>,
        tags: Tags,
    ) -> Result<()> {
        let tags = self.check_registration(tags)?;
        let unit = TimestampedUnit::new(
            self.store.table::<R>()?,
            self.locks.clone(),
            self.config.watermark_key.clone(),
            changed,
            tombstones,
        );
        self.insert_unit(Arc::new(unit), tags);
        Ok(())
    }

    fn check_registration(&self, tags: Tags) -> Result<(Vec<Tag>, bool)> {
        if self.sealed {
            return Err(Error::AlreadyInitialized);
        }
        let names = tags
            .names
            .into_iter()
            .map(Tag::new)
            .collect::<Result<Vec<_>>>()?;
        Ok((names, tags.default))
    }

    fn insert_unit(&mut self, unit: Arc<dyn SyncUnit<C>>, (names, default): (Vec<Tag>, bool)) {
        let kind = unit.kind();

        // A kind has at most one live registration.
        self.registry.remove(&kind);
        for units in self.tags.values_mut() {
            units.retain(|u| u.kind() != kind);
        }
        self.tags.retain(|_, units| !units.is_empty());

        for tag in names {
            let units = self.tags.entry(tag).or_default();
            if !units.iter().any(|u| u.kind() == kind) {
                units.push(unit.clone());
            }
        }
        if default {
            self.registry.insert(kind, unit.clone());
        }

        debug!("Registered {}", unit.entity_set());
    }

    /// Seal the registry.
    ///
    /// # Errors
    /// - `AlreadyInitialized` on a second call
    pub fn initialize(&mut self) -> Result<()> {
        if self.sealed {
            return Err(Error::AlreadyInitialized);
        }
        self.sealed = true;
        info!(
            "Sync coordinator ready: {} kinds, {} tags",
            self.registry.len(),
            self.tags.len()
        );
        Ok(())
    }

    /// Whether [`Self::initialize`] has been called.
    pub fn is_initialized(&self) -> bool {
        self.sealed
    }

    fn ensure_sealed(&self) -> Result<()> {
        if self.sealed {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn new_context(&self) -> Result<Arc<C>> {
        (self.context_factory)().map(Arc::new)
    }

    /// Sync one kind on its own, with a context of its own.
    ///
    /// Returns 0 if the kind is already being synced. The context is only
    /// created once the kind lock is held.
    ///
    /// # Errors
    /// - `NotInitialized` before [`Self::initialize`]
    /// - `NotRegistered` if `R` is not in the default group
    /// - Fetch and store errors from the unit
    pub async fn sync_kind<R: Record>(&self) -> Result<usize> {
        self.ensure_sealed()?;
        let unit = self
            .registry
            .get(&TypeId::of::<R>())
            .cloned()
            .ok_or_else(|| Error::NotRegistered(R::ENTITY_SET.to_string()))?;

        self.run_single(unit).await
    }

    /// Sync one kind of the default group, looked up by entity set name.
    ///
    /// # Errors
    /// Same as [`Self::sync_kind`].
    pub async fn sync_entity_set(&self, name: &str) -> Result<usize> {
        self.ensure_sealed()?;
        let unit = self
            .registry
            .values()
            .find(|u| u.entity_set() == name)
            .cloned()
            .ok_or_else(|| Error::NotRegistered(name.to_string()))?;

        self.run_single(unit).await
    }

    async fn run_single(&self, unit: Arc<dyn SyncUnit<C>>) -> Result<usize> {
        let factory = self.context_factory.clone();
        let context = move || factory().map(Arc::new);
        let result = unit.sync_with(&context).await;
        if let Err(e) = &result {
            warn!("Sync of {} failed: {}", unit.entity_set(), e);
        }
        result
    }

    /// Sync every kind under `tag`, or the default group when `tag` is
    /// `None` or empty, concurrently over one shared context.
    ///
    /// The context is dropped once every unit has finished. If any unit
    /// failed the first failure is returned; units that succeeded keep what
    /// they applied.
    ///
    /// # Errors
    /// - `NotInitialized` before [`Self::initialize`]
    /// - Context factory errors
    /// - The first unit error
    pub async fn sync(&self, tag: Option<&str>) -> Result<GroupSync> {
        self.ensure_sealed()?;

        let units: Vec<Arc<dyn SyncUnit<C>>> = match tag.filter(|t| !t.is_empty()) {
            None => self.registry.values().cloned().collect(),
            Some(name) => match self.tags.get(name) {
                Some(units) => units.clone(),
                None => {
                    info!("No sync registrations under tag {}", name);
                    return Ok(GroupSync::UnknownTag);
                }
            },
        };

        let Some(_group) = self.locks.try_lock(LockKey::Group) else {
            debug!("Group sync already in progress, skipping");
            return Ok(GroupSync::AlreadyRunning);
        };

        let ctx = self.new_context()?;
        let results = join_all(units.iter().map(|unit| unit.sync(ctx.clone()))).await;
        drop(ctx);

        let mut total = 0;
        let mut first_error = None;
        for (unit, result) in units.iter().zip(results) {
            match result {
                Ok(n) => total += n,
                Err(e) => {
                    warn!("Sync of {} failed: {}", unit.entity_set(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            "Group sync {} finished: {} items across {} kinds",
            tag.unwrap_or("*"),
            total,
            units.len()
        );
        Ok(GroupSync::Completed(total))
    }

    /// The persisted watermark of `R`, if any.
    ///
    /// # Errors
    /// - Store errors or an unreadable stored value
    pub fn watermark<R: Record>(&self) -> Result<Option<Timestamp>> {
        let table = self.store.table::<R>()?;
        read_watermark(table.as_ref(), &self.config.watermark_key)
    }

    /// Entity set names of the default group, sorted.
    pub fn registered_kinds(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.registry.values().map(|u| u.entity_set()).collect();
        names.sort_unstable();
        names
    }

    /// Registered tag names, sorted.
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.keys().map(Tag::as_str).collect()
    }

    /// Entity set names under `tag`, in registration order.
    pub fn tagged_kinds(&self, tag: &str) -> Option<Vec<&'static str>> {
        self.tags
            .get(tag)
            .map(|units| units.iter().map(|u| u.entity_set()).collect())
    }
}
