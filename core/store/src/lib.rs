//! Local table abstraction for driftsync.
//!
//! The sync engine only ever talks to the embedded store through the traits
//! in [`table`]: keyed upsert, keyed delete, string metadata slots and a
//! scoped atomic write.
//!
//! # Backends
//! - [`MemoryStore`]: process-local tables, used by tests and embedders
//! - [`FileStore`]: one JSON document per table, replaced atomically on commit

pub mod file;
pub mod memory;
pub mod registry;
pub mod table;

pub use file::{FileStore, FileTable};
pub use memory::{MemoryStore, MemoryTable};
pub use registry::TableRegistry;
pub use table::{LocalStore, LocalTable, TableState, TableWriter};
