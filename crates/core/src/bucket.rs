//! Token-bucket arithmetic.
//!
//! Everything here is pure: callers pass the current time in epoch
//! milliseconds and persist the result themselves. Tokens are fractional so
//! partial accrual carries over between checks; admission uses a `>= 1`
//! test rather than rounding.

use serde::{Deserialize, Serialize};

use crate::tenant::EffectiveLimits;
use crate::types::TierName;

/// Relative tolerance when comparing stored floats against fresh limits.
const LIMIT_TOLERANCE: f64 = 1e-9;

/// Snapshot of one tenant's token bucket.
///
/// Invariants: `0 <= tokens <= capacity`, `refill_rate_per_ms > 0`, and
/// `last_refill_at` never moves backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Bucket {
    pub capacity: f64,
    pub tokens: f64,
    /// Epoch milliseconds of the last refill computation.
    pub last_refill_at: u64,
    pub refill_rate_per_ms: f64,
    /// Tier the bucket was provisioned under.
    pub tier: TierName,
}

impl Bucket {
    /// A full bucket for `limits`, as of `now_ms`.
    #[must_use]
    pub fn full(limits: &EffectiveLimits, now_ms: u64) -> Self {
        let capacity = limits.capacity();
        Self {
            capacity,
            tokens: capacity,
            last_refill_at: now_ms,
            refill_rate_per_ms: limits.refill_rate_per_ms(),
            tier: limits.tier.clone(),
        }
    }

    /// Accrue tokens for the time elapsed since the last refill.
    ///
    /// A clock that reads earlier than `last_refill_at` accrues nothing and
    /// leaves `last_refill_at` untouched, so calling this twice with the same
    /// `now_ms` accrues exactly once.
    #[allow(clippy::cast_precision_loss)]
    pub fn refill(&mut self, now_ms: u64) {
        let elapsed = now_ms.saturating_sub(self.last_refill_at);
        let accrued = self.refill_rate_per_ms * elapsed as f64;
        self.tokens = (self.tokens + accrued).min(self.capacity).max(0.0);
        self.last_refill_at = self.last_refill_at.max(now_ms);
    }

    /// Take one token if at least one is available.
    pub fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }

    /// Milliseconds until a whole token is available (zero if one already is).
    #[must_use]
    pub fn time_to_next_token_ms(&self) -> f64 {
        if self.refill_rate_per_ms <= 0.0 {
            return 0.0;
        }
        (1.0 - self.tokens).max(0.0) / self.refill_rate_per_ms
    }

    /// Whole tokens available.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn remaining(&self) -> u64 {
        self.tokens.max(0.0).floor() as u64
    }

    /// Whether this bucket was provisioned for exactly these limits.
    ///
    /// A different tier, capacity, or refill rate means the tenant's limits
    /// changed since provisioning and the bucket must be reset.
    #[must_use]
    pub fn matches(&self, limits: &EffectiveLimits) -> bool {
        self.tier == limits.tier
            && approx_eq(self.capacity, limits.capacity())
            && approx_eq(self.refill_rate_per_ms, limits.refill_rate_per_ms())
    }

    /// Whether the stored fields satisfy the bucket invariants.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.capacity.is_finite()
            && self.capacity > 0.0
            && self.tokens.is_finite()
            && (0.0..=self.capacity).contains(&self.tokens)
            && self.refill_rate_per_ms.is_finite()
            && self.refill_rate_per_ms > 0.0
    }
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= LIMIT_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(rpm: u32, burst: u32) -> EffectiveLimits {
        EffectiveLimits {
            tier: TierName::from("free"),
            requests_per_minute: rpm,
            burst_capacity: burst,
        }
    }

    fn assert_bounded(bucket: &Bucket) {
        assert!(bucket.tokens >= 0.0, "tokens went negative: {}", bucket.tokens);
        assert!(
            bucket.tokens <= bucket.capacity,
            "tokens {} exceed capacity {}",
            bucket.tokens,
            bucket.capacity
        );
    }

    #[test]
    fn full_bucket_starts_at_capacity() {
        let bucket = Bucket::full(&limits(60, 10), 1_000);
        assert!((bucket.tokens - 10.0).abs() < f64::EPSILON);
        assert!((bucket.capacity - 10.0).abs() < f64::EPSILON);
        assert_eq!(bucket.last_refill_at, 1_000);
        assert!((bucket.refill_rate_per_ms - 0.001).abs() < f64::EPSILON);
    }

    #[test]
    fn burst_admits_exactly_capacity() {
        let mut bucket = Bucket::full(&limits(60, 10), 0);
        for expected_remaining in (0..10).rev() {
            bucket.refill(0);
            assert!(bucket.try_consume());
            assert_eq!(bucket.remaining(), expected_remaining);
            assert_bounded(&bucket);
        }
        bucket.refill(0);
        assert!(!bucket.try_consume());
        assert_bounded(&bucket);
    }

    #[test]
    fn refill_accrues_fractional_tokens() {
        let mut bucket = Bucket::full(&limits(60, 10), 0);
        bucket.tokens = 0.0;

        bucket.refill(1_500);
        assert!((bucket.tokens - 1.5).abs() < 1e-9);
        assert!(bucket.try_consume());
        assert_eq!(bucket.remaining(), 0);
        assert!((bucket.tokens - 0.5).abs() < 1e-9);
    }

    #[test]
    fn refill_is_capped_at_capacity() {
        let mut bucket = Bucket::full(&limits(60, 10), 0);
        bucket.tokens = 9.5;
        bucket.refill(3_600_000);
        assert!((bucket.tokens - 10.0).abs() < f64::EPSILON);
        assert_bounded(&bucket);
    }

    #[test]
    fn refill_twice_with_same_instant_accrues_once() {
        let mut bucket = Bucket::full(&limits(60, 10), 0);
        bucket.tokens = 0.0;
        bucket.refill(2_000);
        let after_first = bucket.tokens;
        bucket.refill(2_000);
        assert!((bucket.tokens - after_first).abs() < f64::EPSILON);
        assert!((after_first - 2.0).abs() < 1e-9);
    }

    #[test]
    fn clock_regression_never_subtracts() {
        let mut bucket = Bucket::full(&limits(60, 10), 10_000);
        bucket.tokens = 3.0;
        bucket.refill(5_000);
        assert!((bucket.tokens - 3.0).abs() < f64::EPSILON);
        assert_eq!(bucket.last_refill_at, 10_000);
    }

    #[test]
    fn refill_never_decreases_tokens() {
        let mut bucket = Bucket::full(&limits(600, 30), 0);
        bucket.tokens = 4.25;
        let mut last = bucket.tokens;
        for now in [0, 10, 10, 5, 250, 100_000] {
            bucket.refill(now);
            assert!(bucket.tokens >= last);
            assert_bounded(&bucket);
            last = bucket.tokens;
        }
    }

    #[test]
    fn consume_takes_exactly_one() {
        let mut bucket = Bucket::full(&limits(60, 10), 0);
        bucket.tokens = 1.25;
        assert!(bucket.try_consume());
        assert!((bucket.tokens - 0.25).abs() < 1e-9);
        assert!(!bucket.try_consume());
        assert!((bucket.tokens - 0.25).abs() < 1e-9);
    }

    #[test]
    fn time_to_next_token() {
        let mut bucket = Bucket::full(&limits(60, 10), 0);
        assert!(bucket.time_to_next_token_ms().abs() < f64::EPSILON);

        bucket.tokens = 0.0;
        assert!((bucket.time_to_next_token_ms() - 1_000.0).abs() < 1e-6);

        bucket.tokens = 0.75;
        assert!((bucket.time_to_next_token_ms() - 250.0).abs() < 1e-6);
    }

    #[test]
    fn matches_detects_limit_changes() {
        let free = limits(60, 10);
        let bucket = Bucket::full(&free, 0);
        assert!(bucket.matches(&free));

        assert!(!bucket.matches(&limits(60, 20)));
        assert!(!bucket.matches(&limits(120, 10)));

        let mut other_tier = free.clone();
        other_tier.tier = TierName::from("premium");
        assert!(!bucket.matches(&other_tier));
    }

    #[test]
    fn well_formed_rejects_broken_records() {
        let mut bucket = Bucket::full(&limits(60, 10), 0);
        assert!(bucket.is_well_formed());

        bucket.tokens = 11.0;
        assert!(!bucket.is_well_formed());

        bucket.tokens = 5.0;
        bucket.refill_rate_per_ms = 0.0;
        assert!(!bucket.is_well_formed());

        bucket.refill_rate_per_ms = f64::NAN;
        assert!(!bucket.is_well_formed());
    }
}
