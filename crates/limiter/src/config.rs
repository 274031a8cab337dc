use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Behavior when the shared store is unavailable.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorBehavior {
    /// Allow requests through (fail-open).
    #[default]
    Allow,
    /// Deny requests (fail-closed).
    Deny,
}

/// How the read-modify-write on a bucket is made visible to other instances.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// Plain load then save. Concurrent checks for one tenant can over-admit
    /// by up to the number of racing requests; the last writer wins.
    #[default]
    Approximate,
    /// Optimistic compare-and-set on the bucket version, retried on conflict.
    Atomic,
}

/// Runtime knobs for [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    pub on_error: ErrorBehavior,
    pub consistency: Consistency,
    /// Inactivity window after which an untouched bucket is dropped.
    pub bucket_ttl: Duration,
    /// Upper bound on every store round trip.
    pub store_timeout: Duration,
    /// Extra attempts after a CAS conflict in [`Consistency::Atomic`] mode.
    pub max_cas_retries: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            on_error: ErrorBehavior::Allow,
            consistency: Consistency::Approximate,
            bucket_ttl: Duration::from_secs(3600),
            store_timeout: Duration::from_millis(250),
            max_cas_retries: 5,
        }
    }
}
