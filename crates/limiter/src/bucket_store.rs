//! Persistence of one token bucket per tenant.
//!
//! Buckets are stored as field records under `rate_limit:{tenant_id}` with an
//! inactivity TTL that every write resets. The typed [`Bucket`] is converted
//! to and from its stored fields only in this module.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use tollgate_core::{Bucket, EffectiveLimits, TenantId, TierName};
use tollgate_state::{CasResult, Fields, KeyKind, StateError, StateKey, StateStore};

use crate::error::LimiterError;

const FIELD_CAPACITY: &str = "capacity";
const FIELD_TOKENS: &str = "tokens";
const FIELD_LAST_REFILL_AT: &str = "last_refill_at";
const FIELD_REFILL_RATE: &str = "refill_rate_per_ms";
const FIELD_TIER: &str = "tier";

/// What a [`BucketStore::load`] found.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedBucket {
    /// No bucket, or it expired.
    Missing,
    /// A record exists but does not decode to a valid bucket.
    Corrupt { version: u64, reason: String },
    /// A valid bucket at `version`.
    Stored { bucket: Bucket, version: u64 },
}

impl LoadedBucket {
    /// Version of the underlying record (0 when missing).
    #[must_use]
    pub fn version(&self) -> u64 {
        match self {
            Self::Missing => 0,
            Self::Corrupt { version, .. } | Self::Stored { version, .. } => *version,
        }
    }

    #[must_use]
    pub fn into_bucket(self) -> Option<Bucket> {
        match self {
            Self::Stored { bucket, .. } => Some(bucket),
            _ => None,
        }
    }
}

/// Bucket persistence over a shared [`StateStore`].
///
/// Every store call is bounded by `timeout`; a timeout or any store error
/// surfaces as [`LimiterError::StoreUnavailable`] and is never mistaken for a
/// missing bucket.
#[derive(Clone)]
pub struct BucketStore {
    store: Arc<dyn StateStore>,
    ttl: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for BucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketStore")
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BucketStore {
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout,
        }
    }

    /// Inactivity window applied on every write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(tenant_id: &TenantId) -> StateKey {
        StateKey::rate_limit(tenant_id.as_str())
    }

    /// Run a store call under the configured timeout.
    async fn guarded<T, F>(&self, operation: &'static str, call: F) -> Result<T, LimiterError>
    where
        F: Future<Output = Result<T, StateError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| LimiterError::store(operation, e)),
            Err(_) => Err(LimiterError::store(
                operation,
                StateError::Timeout(self.timeout),
            )),
        }
    }

    /// Read the tenant's bucket.
    #[instrument(name = "bucket_store.load", skip_all, fields(tenant_id = %tenant_id))]
    pub async fn load(&self, tenant_id: &TenantId) -> Result<LoadedBucket, LimiterError> {
        let key = Self::key(tenant_id);
        let Some(record) = self.guarded("load", self.store.get_fields(&key)).await? else {
            return Ok(LoadedBucket::Missing);
        };

        match decode(&record.fields) {
            Ok(bucket) => Ok(LoadedBucket::Stored {
                bucket,
                version: record.version,
            }),
            Err(reason) => {
                warn!(%key, %reason, "stored bucket is corrupt");
                Ok(LoadedBucket::Corrupt {
                    version: record.version,
                    reason,
                })
            }
        }
    }

    /// Write every bucket field and reset the inactivity TTL.
    ///
    /// Returns the record's new version.
    #[instrument(name = "bucket_store.save", skip_all, fields(tenant_id = %tenant_id))]
    pub async fn save(&self, tenant_id: &TenantId, bucket: &Bucket) -> Result<u64, LimiterError> {
        let key = Self::key(tenant_id);
        let fields = encode(bucket);
        self.guarded("save", self.store.set_fields(&key, &fields, Some(self.ttl)))
            .await
    }

    /// Write the bucket only if the stored record is still at
    /// `expected_version` (0 meaning "still absent").
    #[instrument(name = "bucket_store.save_if_version", skip_all, fields(tenant_id = %tenant_id))]
    pub async fn save_if_version(
        &self,
        tenant_id: &TenantId,
        bucket: &Bucket,
        expected_version: u64,
    ) -> Result<CasResult, LimiterError> {
        let key = Self::key(tenant_id);
        let fields = encode(bucket);
        self.guarded(
            "save_if_version",
            self.store
                .compare_and_set_fields(&key, expected_version, &fields, Some(self.ttl)),
        )
        .await
    }

    /// Persist a full bucket for `limits`, replacing whatever was stored.
    #[instrument(name = "bucket_store.provision", skip_all, fields(tenant_id = %tenant_id, tier = %limits.tier))]
    pub async fn provision(
        &self,
        tenant_id: &TenantId,
        limits: &EffectiveLimits,
        now_ms: u64,
    ) -> Result<Bucket, LimiterError> {
        let bucket = Bucket::full(limits, now_ms);
        self.save(tenant_id, &bucket).await?;
        debug!(capacity = bucket.capacity, "bucket provisioned");
        Ok(bucket)
    }

    /// Drop the tenant's bucket. Returns `true` if one existed.
    #[instrument(name = "bucket_store.clear", skip_all, fields(tenant_id = %tenant_id))]
    pub async fn clear(&self, tenant_id: &TenantId) -> Result<bool, LimiterError> {
        let key = Self::key(tenant_id);
        self.guarded("clear", self.store.delete(&key)).await
    }

    /// Drop every bucket. Returns how many were removed.
    #[instrument(name = "bucket_store.clear_all", skip_all)]
    pub async fn clear_all(&self) -> Result<usize, LimiterError> {
        let ids = self
            .guarded("scan", self.store.scan_keys(KeyKind::RateLimit, None))
            .await?;

        let mut removed = 0;
        for id in ids {
            let key = StateKey::rate_limit(id);
            if self.guarded("clear", self.store.delete(&key)).await? {
                removed += 1;
            }
        }
        debug!(removed, "buckets cleared");
        Ok(removed)
    }
}

fn encode(bucket: &Bucket) -> Fields {
    [
        (FIELD_CAPACITY, bucket.capacity.to_string()),
        (FIELD_TOKENS, bucket.tokens.to_string()),
        (FIELD_LAST_REFILL_AT, bucket.last_refill_at.to_string()),
        (FIELD_REFILL_RATE, bucket.refill_rate_per_ms.to_string()),
        (FIELD_TIER, bucket.tier.to_string()),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_owned(), value))
    .collect()
}

fn field<'a>(fields: &'a Fields, name: &str) -> Result<&'a str, String> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| format!("missing field `{name}`"))
}

fn parse_field<T: std::str::FromStr>(fields: &Fields, name: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    field(fields, name)?
        .parse()
        .map_err(|e| format!("field `{name}`: {e}"))
}

fn decode(fields: &Fields) -> Result<Bucket, String> {
    let bucket = Bucket {
        capacity: parse_field(fields, FIELD_CAPACITY)?,
        tokens: parse_field(fields, FIELD_TOKENS)?,
        last_refill_at: parse_field(fields, FIELD_LAST_REFILL_AT)?,
        refill_rate_per_ms: parse_field(fields, FIELD_REFILL_RATE)?,
        tier: TierName::from(field(fields, FIELD_TIER)?),
    };
    if !bucket.is_well_formed() {
        return Err("bucket invariants violated".to_owned());
    }
    Ok(bucket)
}
