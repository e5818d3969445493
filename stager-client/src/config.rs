//! Upload configuration

use serde::{Deserialize, Serialize};
use std::num::{NonZeroU64, NonZeroUsize};
use std::time::Duration;

use stager_core::limits::DEFAULT_CHUNK_SIZE;
use stager_net::OCTET_STREAM;

use crate::RetryPolicy;

const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Tunables for one coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Preferred part size in bytes
    pub chunk_size: NonZeroU64,
    /// Maximum part transfers in flight
    pub concurrency: NonZeroUsize,
    /// Retries per part transfer
    pub part_retry: RetryPolicy,
    /// Retries for authorize, finalize and abort calls
    pub control_retry: RetryPolicy,
    pub content_type: String,
    pub request_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            chunk_size: NonZeroU64::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroU64::MIN),
            concurrency: NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN),
            part_retry: RetryPolicy::default(),
            control_retry: RetryPolicy::default(),
            content_type: OCTET_STREAM.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl UploadConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_part_retry(mut self, policy: RetryPolicy) -> Self {
        self.part_retry = policy;
        self
    }

    pub fn with_control_retry(mut self, policy: RetryPolicy) -> Self {
        self.control_retry = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UploadConfig::default();
        assert_eq!(config.chunk_size.get(), 10 * 1024 * 1024);
        assert_eq!(config.concurrency.get(), 4);
        assert_eq!(config.part_retry.attempts(), 3);
        assert_eq!(config.content_type, "application/octet-stream");
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: UploadConfig =
            serde_json::from_str(r#"{"concurrency": 8, "part_retry": {"max_retries": 5}}"#).unwrap();
        assert_eq!(config.concurrency.get(), 8);
        assert_eq!(config.part_retry.max_retries, 5);
        assert_eq!(config.part_retry.base_delay_ms, 200);
        assert_eq!(config.chunk_size.get(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        assert!(serde_json::from_str::<UploadConfig>(r#"{"concurrency": 0}"#).is_err());
    }
}
