use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use tollgate_core::{Bucket, Decision, EffectiveLimits, TenantId};
use tollgate_state::CasResult;

use crate::bucket_store::{BucketStore, LoadedBucket};
use crate::clock::Clock;
use crate::config::{Consistency, ErrorBehavior, LimiterConfig};
use crate::error::LimiterError;
use crate::metrics::LimiterMetrics;

/// Token-bucket rate limiter over a shared store.
///
/// Each check runs `load -> refill -> try_consume -> save` against the
/// tenant's bucket. Denied checks never write.
///
/// In [`Consistency::Approximate`] mode that sequence is a plain
/// read-modify-write: two instances checking the same tenant at the same
/// moment can both read the same token count and both admit, so a tenant can
/// be over-admitted by up to the number of concurrent requests, with the last
/// writer's token count winning. [`Consistency::Atomic`] closes that race with
/// a compare-and-set on the bucket version.
pub struct RateLimiter {
    buckets: BucketStore,
    clock: Arc<dyn Clock>,
    config: LimiterConfig,
    metrics: Arc<LimiterMetrics>,
}

/// Outcome of one attempt in atomic mode.
enum Attempt {
    Done(Decision),
    Conflict,
}

impl RateLimiter {
    pub(crate) fn from_parts(
        buckets: BucketStore,
        clock: Arc<dyn Clock>,
        config: LimiterConfig,
        metrics: Arc<LimiterMetrics>,
    ) -> Self {
        Self {
            buckets,
            clock,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<LimiterMetrics> {
        &self.metrics
    }

    pub fn buckets(&self) -> &BucketStore {
        &self.buckets
    }

    /// Decide whether the tenant may make one more request.
    ///
    /// Never fails: when the store is unavailable the decision follows
    /// [`LimiterConfig::on_error`] and is marked as degraded.
    #[instrument(
        name = "limiter.check",
        skip_all,
        fields(tenant_id = %tenant_id, tier = %limits.tier)
    )]
    pub async fn check_rate_limit(&self, tenant_id: &TenantId, limits: &EffectiveLimits) -> Decision {
        match self.try_check_rate_limit(tenant_id, limits).await {
            Ok(decision) => decision,
            Err(e) => {
                let now = self.clock.now_millis();
                match self.config.on_error {
                    ErrorBehavior::Allow => {
                        warn!(error = %e, "rate limit store unavailable, failing open");
                        self.metrics.increment_fail_open();
                        Decision::fail_open(limits, now)
                    }
                    ErrorBehavior::Deny => {
                        warn!(error = %e, "rate limit store unavailable, failing closed");
                        self.metrics.increment_fail_closed();
                        Decision::fail_closed(limits, now)
                    }
                }
            }
        }
    }

    /// Decide whether the tenant may make one more request, surfacing store
    /// failures to the caller.
    pub async fn try_check_rate_limit(
        &self,
        tenant_id: &TenantId,
        limits: &EffectiveLimits,
    ) -> Result<Decision, LimiterError> {
        self.metrics.increment_checks();
        let decision = match self.config.consistency {
            Consistency::Approximate => self.check_approximate(tenant_id, limits).await?,
            Consistency::Atomic => self.check_atomic(tenant_id, limits).await?,
        };

        if decision.admitted {
            self.metrics.increment_admitted();
        } else {
            self.metrics.increment_denied();
            debug!(
                retry_after = decision.retry_after_seconds,
                "request denied by rate limit"
            );
        }
        Ok(decision)
    }

    async fn check_approximate(
        &self,
        tenant_id: &TenantId,
        limits: &EffectiveLimits,
    ) -> Result<Decision, LimiterError> {
        let now = self.clock.now_millis();
        let loaded = self.buckets.load(tenant_id).await?;

        let mut bucket = match self.usable(loaded, limits) {
            Some(bucket) => bucket,
            None => {
                self.metrics.increment_provisioned();
                self.buckets.provision(tenant_id, limits, now).await?
            }
        };

        bucket.refill(now);
        let admitted = bucket.try_consume();
        if admitted {
            self.buckets.save(tenant_id, &bucket).await?;
        }
        Ok(Decision::from_bucket(admitted, &bucket, now))
    }

    async fn check_atomic(
        &self,
        tenant_id: &TenantId,
        limits: &EffectiveLimits,
    ) -> Result<Decision, LimiterError> {
        let attempts = self.config.max_cas_retries.saturating_add(1);
        for _ in 0..attempts {
            match self.attempt_atomic(tenant_id, limits).await? {
                Attempt::Done(decision) => return Ok(decision),
                Attempt::Conflict => self.metrics.increment_cas_conflicts(),
            }
        }
        Err(LimiterError::Contention {
            tenant_id: tenant_id.clone(),
            attempts,
        })
    }

    async fn attempt_atomic(
        &self,
        tenant_id: &TenantId,
        limits: &EffectiveLimits,
    ) -> Result<Attempt, LimiterError> {
        let now = self.clock.now_millis();
        let loaded = self.buckets.load(tenant_id).await?;
        let version = loaded.version();

        let (mut bucket, fresh) = match self.usable(loaded, limits) {
            Some(bucket) => (bucket, false),
            None => (Bucket::full(limits, now), true),
        };

        bucket.refill(now);
        let admitted = bucket.try_consume();

        // A denied check against an existing bucket leaves it untouched. A
        // fresh bucket is always written so the reset is not lost.
        if admitted || fresh {
            match self.buckets.save_if_version(tenant_id, &bucket, version).await? {
                CasResult::Ok { .. } => {
                    if fresh {
                        self.metrics.increment_provisioned();
                    }
                }
                CasResult::Conflict { current_version } => {
                    debug!(expected = version, current_version, "bucket changed underneath, retrying");
                    return Ok(Attempt::Conflict);
                }
            }
        }
        Ok(Attempt::Done(Decision::from_bucket(admitted, &bucket, now)))
    }

    /// The stored bucket, if it can be used as-is for `limits`.
    fn usable(&self, loaded: LoadedBucket, limits: &EffectiveLimits) -> Option<Bucket> {
        match loaded {
            LoadedBucket::Stored { bucket, .. } if bucket.matches(limits) => Some(bucket),
            LoadedBucket::Stored { bucket, .. } => {
                info!(
                    from_tier = %bucket.tier,
                    to_tier = %limits.tier,
                    capacity = limits.burst_capacity,
                    "limits changed, resetting bucket"
                );
                self.metrics.increment_tier_resets();
                None
            }
            LoadedBucket::Corrupt { .. } => {
                self.metrics.increment_corrupt_records();
                None
            }
            LoadedBucket::Missing => None,
        }
    }

    /// Drop one tenant's bucket. Its next request starts full.
    pub async fn clear_bucket(&self, tenant_id: &TenantId) -> Result<bool, LimiterError> {
        let removed = self.buckets.clear(tenant_id).await?;
        info!(tenant_id = %tenant_id, removed, "bucket cleared");
        Ok(removed)
    }

    /// Drop every tenant's bucket.
    pub async fn clear_all_buckets(&self) -> Result<usize, LimiterError> {
        let removed = self.buckets.clear_all().await?;
        info!(removed, "all buckets cleared");
        Ok(removed)
    }

    /// The tenant's bucket as it would look right now, without consuming or
    /// writing anything.
    pub async fn peek_bucket(&self, tenant_id: &TenantId) -> Result<Option<Bucket>, LimiterError> {
        let now = self.clock.now_millis();
        Ok(self.buckets.load(tenant_id).await?.into_bucket().map(|mut bucket| {
            bucket.refill(now);
            bucket
        }))
    }
}
