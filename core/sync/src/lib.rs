//! DriftSync Sync Engine
//!
//! Incremental pull sync of a local store from a paged remote source:
//! - Per-kind watermarks persisted as table metadata
//! - Lazy paged fetch sequences for changed records and tombstones
//! - Atomic apply of each kind's delta
//! - Non-blocking per-kind locks and tag-scoped group runs

pub mod accumulator;
pub mod config;
pub mod coordinator;
pub mod fetch;
pub mod lock;
pub mod retry;
pub mod unit;
pub mod watermark;

#[cfg(test)]
mod testing;

// Re-export main types
pub use accumulator::{DeletableAccumulator, TombstoneAccumulator, UpdateAccumulator};
pub use config::SyncConfig;
pub use coordinator::{ContextFactory, GroupSync, SyncCoordinator, Tags};
pub use fetch::{
    fixed_pages, paginate, paginate_with_policy, ChangedFetch, Page, PageFetchPolicy, PageStream,
    TombstoneFetch,
};
pub use lock::{KindGuard, KindLocks, LockKey};
pub use retry::{RetryConfig, RetryExecutor};
pub use unit::{ContextSource, DeletableUnit, SyncUnit, TimestampedUnit};
pub use watermark::{
    decode_watermark, encode_watermark, max_timestamp, read_watermark, to_local,
    DEFAULT_WATERMARK_KEY,
};
