use serde::{Deserialize, Serialize};

use crate::bucket::Bucket;
use crate::tenant::EffectiveLimits;

/// Retry hint handed out when the limiter fails closed.
pub const FAIL_CLOSED_RETRY_SECONDS: u64 = 60;

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    /// Computed from the tenant's bucket.
    Bucket,
    /// The store was unreachable and the request was let through.
    FailOpen,
    /// The store was unreachable and the request was refused.
    FailClosed,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Decision {
    pub admitted: bool,
    /// The tenant's burst capacity.
    pub limit: u64,
    /// Whole tokens left after this check.
    pub remaining: u64,
    /// Epoch milliseconds at which the next token becomes available.
    pub reset_time_ms: u64,
    /// Seconds a denied client should wait. Zero when admitted.
    pub retry_after_seconds: u64,
    pub basis: DecisionBasis,
}

impl Decision {
    /// Build a decision from a bucket that has already been refilled and,
    /// if admitted, consumed.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_bucket(admitted: bool, bucket: &Bucket, now_ms: u64) -> Self {
        let wait_ms = bucket.time_to_next_token_ms().max(0.0).ceil();
        let reset_time_ms = now_ms.saturating_add(wait_ms as u64);
        let retry_after_seconds = if admitted {
            0
        } else {
            ((wait_ms / 1000.0).ceil() as u64).max(1)
        };

        Self {
            admitted,
            limit: bucket.capacity.max(0.0).floor() as u64,
            remaining: bucket.remaining(),
            reset_time_ms,
            retry_after_seconds,
            basis: DecisionBasis::Bucket,
        }
    }

    /// Admit without consulting the store.
    #[must_use]
    pub fn fail_open(limits: &EffectiveLimits, now_ms: u64) -> Self {
        let limit = u64::from(limits.burst_capacity);
        Self {
            admitted: true,
            limit,
            remaining: limit,
            reset_time_ms: now_ms,
            retry_after_seconds: 0,
            basis: DecisionBasis::FailOpen,
        }
    }

    /// Refuse without consulting the store.
    #[must_use]
    pub fn fail_closed(limits: &EffectiveLimits, now_ms: u64) -> Self {
        Self {
            admitted: false,
            limit: u64::from(limits.burst_capacity),
            remaining: 0,
            reset_time_ms: now_ms.saturating_add(FAIL_CLOSED_RETRY_SECONDS * 1000),
            retry_after_seconds: FAIL_CLOSED_RETRY_SECONDS,
            basis: DecisionBasis::FailClosed,
        }
    }

    /// Whether the store actually took part in this decision.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.basis != DecisionBasis::Bucket
    }
}
