use std::time::Duration;

use serde::Deserialize;

use tollgate_limiter::{Consistency, ErrorBehavior, LimiterConfig};

/// Admission behavior, loaded from the `[rate_limit]` table.
///
/// # Example
///
/// ```toml
/// [rate_limit]
/// on_error = "allow"
/// consistency = "atomic"
/// bucket_ttl_seconds = 3600
/// store_timeout_ms = 250
/// ```
#[derive(Debug, Deserialize)]
pub struct RateLimitConfig {
    /// What to do when the store cannot answer: `"allow"` or `"deny"`.
    #[serde(default)]
    pub on_error: ErrorBehavior,
    /// `"approximate"` (plain read-modify-write) or `"atomic"` (CAS).
    #[serde(default)]
    pub consistency: Consistency,
    /// Idle buckets are dropped after this many seconds.
    #[serde(default = "default_bucket_ttl")]
    pub bucket_ttl_seconds: u64,
    /// Upper bound on each store or directory call, in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    /// Retries after a CAS conflict in atomic mode.
    #[serde(default = "default_max_cas_retries")]
    pub max_cas_retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            on_error: ErrorBehavior::default(),
            consistency: Consistency::default(),
            bucket_ttl_seconds: default_bucket_ttl(),
            store_timeout_ms: default_store_timeout(),
            max_cas_retries: default_max_cas_retries(),
        }
    }
}

impl RateLimitConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Convert into the limiter's runtime config.
    pub fn to_limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            on_error: self.on_error,
            consistency: self.consistency,
            bucket_ttl: Duration::from_secs(self.bucket_ttl_seconds),
            store_timeout: self.store_timeout(),
            max_cas_retries: self.max_cas_retries,
        }
    }
}

fn default_bucket_ttl() -> u64 {
    3600
}

fn default_store_timeout() -> u64 {
    250
}

fn default_max_cas_retries() -> u32 {
    5
}
