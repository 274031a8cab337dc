use std::sync::Arc;

use tollgate_state::StateStore;

use crate::bucket_store::BucketStore;
use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;
use crate::error::LimiterError;
use crate::limiter::RateLimiter;
use crate::metrics::LimiterMetrics;

/// Fluent builder for constructing a [`RateLimiter`].
///
/// A [`StateStore`] must be supplied. The clock defaults to the wall clock,
/// the config to [`LimiterConfig::default`], and metrics to a fresh set of
/// counters.
#[derive(Default)]
pub struct RateLimiterBuilder {
    store: Option<Arc<dyn StateStore>>,
    clock: Option<Arc<dyn Clock>>,
    config: LimiterConfig,
    metrics: Option<Arc<LimiterMetrics>>,
}

impl RateLimiterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shared store holding the buckets.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn config(mut self, config: LimiterConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing metrics instance, e.g. with the HTTP layer.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<LimiterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Consume the builder and produce a [`RateLimiter`].
    ///
    /// # Errors
    ///
    /// Returns a [`LimiterError::Configuration`] if no store was supplied or
    /// the timeouts are zero.
    pub fn build(self) -> Result<RateLimiter, LimiterError> {
        let store = self
            .store
            .ok_or_else(|| LimiterError::Configuration("state store is required".into()))?;
        if self.config.store_timeout.is_zero() {
            return Err(LimiterError::Configuration(
                "store timeout must be greater than zero".into(),
            ));
        }
        if self.config.bucket_ttl.is_zero() {
            return Err(LimiterError::Configuration(
                "bucket TTL must be greater than zero".into(),
            ));
        }

        let buckets = BucketStore::new(store, self.config.bucket_ttl, self.config.store_timeout);
        Ok(RateLimiter::from_parts(
            buckets,
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            self.config,
            self.metrics.unwrap_or_default(),
        ))
    }
}
