//! Sync coordinator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::fetch::PageFetchPolicy;
use crate::retry::RetryConfig;
use crate::watermark::DEFAULT_WATERMARK_KEY;

/// Configuration for the sync coordinator and the fetch sources it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Metadata key each table stores its watermark under.
    pub watermark_key: String,
    /// Upper bound for a single page fetch, in milliseconds.
    pub page_timeout_ms: Option<u64>,
    /// Retries per page for transient fetch errors.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub retry_initial_delay_ms: u64,
}

impl SyncConfig {
    /// Page fetch policy derived from this configuration.
    pub fn page_policy(&self) -> PageFetchPolicy {
        let retry = RetryConfig::new(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.retry_initial_delay_ms));

        PageFetchPolicy {
            timeout: self.page_timeout_ms.map(Duration::from_millis),
            retry,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            watermark_key: DEFAULT_WATERMARK_KEY.to_string(),
            page_timeout_ms: None,
            max_retries: 0,
            retry_initial_delay_ms: 500,
        }
    }
}
