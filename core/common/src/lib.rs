//! Common types shared across driftsync crates.
//!
//! This module provides the error taxonomy and the record model that the
//! local store and the sync engine agree on.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{DeletableRecord, Record, Tag, Timestamp, Tombstone};
