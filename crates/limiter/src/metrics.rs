use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking admission outcomes.
///
/// All counters use relaxed ordering for maximum throughput. For a
/// consistent point-in-time view, call [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct LimiterMetrics {
    /// Admission checks performed.
    pub checks: AtomicU64,
    /// Checks that admitted the request from the bucket.
    pub admitted: AtomicU64,
    /// Checks that denied the request from the bucket.
    pub denied: AtomicU64,
    /// Buckets created from scratch (first request or after expiry).
    pub provisioned: AtomicU64,
    /// Buckets reset because the tenant's tier or overrides changed.
    pub tier_resets: AtomicU64,
    /// Stored buckets that could not be decoded.
    pub corrupt_records: AtomicU64,
    /// Compare-and-set conflicts in atomic mode.
    pub cas_conflicts: AtomicU64,
    /// Requests admitted because the store was unavailable.
    pub fail_open: AtomicU64,
    /// Requests denied because the store was unavailable.
    pub fail_closed: AtomicU64,
}

impl LimiterMetrics {
    pub fn increment_checks(&self) {
        self.checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_provisioned(&self) {
        self.provisioned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_tier_resets(&self) {
        self.tier_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_corrupt_records(&self) {
        self.corrupt_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cas_conflicts(&self) {
        self.cas_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fail_open(&self) {
        self.fail_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fail_closed(&self) {
        self.fail_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            checks: self.checks.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            provisioned: self.provisioned.load(Ordering::Relaxed),
            tier_resets: self.tier_resets.load(Ordering::Relaxed),
            corrupt_records: self.corrupt_records.load(Ordering::Relaxed),
            cas_conflicts: self.cas_conflicts.load(Ordering::Relaxed),
            fail_open: self.fail_open.load(Ordering::Relaxed),
            fail_closed: self.fail_closed.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`LimiterMetrics`] at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub checks: u64,
    pub admitted: u64,
    pub denied: u64,
    pub provisioned: u64,
    pub tier_resets: u64,
    pub corrupt_records: u64,
    pub cas_conflicts: u64,
    pub fail_open: u64,
    pub fail_closed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let snap = LimiterMetrics::default().snapshot();
        assert_eq!(
            snap,
            MetricsSnapshot {
                checks: 0,
                admitted: 0,
                denied: 0,
                provisioned: 0,
                tier_resets: 0,
                corrupt_records: 0,
                cas_conflicts: 0,
                fail_open: 0,
                fail_closed: 0,
            }
        );
    }

    #[test]
    fn increment_and_snapshot() {
        let m = LimiterMetrics::default();
        m.increment_checks();
        m.increment_checks();
        m.increment_admitted();
        m.increment_denied();
        m.increment_provisioned();
        m.increment_tier_resets();
        m.increment_corrupt_records();
        m.increment_cas_conflicts();
        m.increment_fail_open();
        m.increment_fail_closed();

        let snap = m.snapshot();
        assert_eq!(snap.checks, 2);
        assert_eq!(snap.admitted, 1);
        assert_eq!(snap.denied, 1);
        assert_eq!(snap.provisioned, 1);
        assert_eq!(snap.tier_resets, 1);
        assert_eq!(snap.corrupt_records, 1);
        assert_eq!(snap.cas_conflicts, 1);
        assert_eq!(snap.fail_open, 1);
        assert_eq!(snap.fail_closed, 1);
    }
}
