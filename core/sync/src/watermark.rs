//! Watermark persistence and timestamp helpers.
//!
//! A watermark is the highest modification time that has been applied for
//! one entity kind. It lives in a string metadata slot on the kind's table,
//! encoded as RFC 3339 with the local UTC offset so that it round-trips to
//! the exact instant.

use chrono::{DateTime, Local, SecondsFormat, Utc};

use driftsync_common::{Error, Record, Result, Timestamp};
use driftsync_store::LocalTable;

/// Metadata key the watermark is stored under unless configured otherwise.
pub const DEFAULT_WATERMARK_KEY: &str = "sync.ts";

/// Later of two optional timestamps. Ties keep `a`.
pub fn max_timestamp(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if a >= b { a } else { b }),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Latest timestamp in a batch, or `None` for an empty batch.
pub fn latest<I>(timestamps: I) -> Option<Timestamp>
where
    I: IntoIterator<Item = Timestamp>,
{
    timestamps.into_iter().fold(None, |acc, ts| max_timestamp(acc, Some(ts)))
}

/// Encode a watermark for storage.
pub fn encode_watermark(ts: Timestamp) -> String {
    ts.with_timezone(&Local)
        .to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Decode a stored watermark. An empty slot means no watermark.
///
/// # Errors
/// - Value is not an RFC 3339 timestamp with an explicit offset
pub fn decode_watermark(value: &str) -> Result<Option<Timestamp>> {
    if value.is_empty() {
        return Ok(None);
    }

    DateTime::parse_from_rfc3339(value)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|e| Error::InvalidTimestamp(format!("{:?}: {}", value, e)))
}

/// Express a watermark in local time.
pub fn to_local(ts: Timestamp) -> DateTime<Local> {
    ts.with_timezone(&Local)
}

/// Read the persisted watermark of a table.
pub fn read_watermark<R: Record>(table: &dyn LocalTable<R>, key: &str) -> Result<Option<Timestamp>> {
    match table.get_metadata(key)? {
        Some(value) => decode_watermark(&value),
        None => Ok(None),
    }
}
