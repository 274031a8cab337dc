use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tollgate_core::{DecisionBasis, EffectiveLimits, TenantId, TierName};
use tollgate_limiter::{
    Consistency, ErrorBehavior, LimiterConfig, ManualClock, RateLimiter, RateLimiterBuilder,
};
use tollgate_state::{CasResult, FieldSet, Fields, KeyKind, StateError, StateKey, StateStore};
use tollgate_state_memory::MemoryStateStore;

const T0: u64 = 1_700_000_000_000;

fn limits(tier: &str, rpm: u32, burst: u32) -> EffectiveLimits {
    EffectiveLimits {
        tier: TierName::from(tier),
        requests_per_minute: rpm,
        burst_capacity: burst,
    }
}

fn free() -> EffectiveLimits {
    limits("free", 60, 10)
}

fn limiter_with(
    store: Arc<dyn StateStore>,
    clock: Arc<ManualClock>,
    config: LimiterConfig,
) -> RateLimiter {
    RateLimiterBuilder::new()
        .store(store)
        .clock(clock)
        .config(config)
        .build()
        .unwrap()
}

fn setup(config: LimiterConfig) -> (RateLimiter, Arc<ManualClock>, Arc<MemoryStateStore>) {
    let store = Arc::new(MemoryStateStore::new());
    let clock = Arc::new(ManualClock::new(T0));
    let limiter = limiter_with(store.clone(), Arc::clone(&clock), config);
    (limiter, clock, store)
}

/// Delegates to a memory store, yielding to the scheduler before every call
/// so concurrent checks interleave between load and save.
struct YieldingStore(MemoryStateStore);

#[async_trait]
impl StateStore for YieldingStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        tokio::task::yield_now().await;
        self.0.check_and_set(key, value, ttl).await
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        tokio::task::yield_now().await;
        self.0.get(key).await
    }

    async fn set(&self, key: &StateKey, value: &str, ttl: Option<Duration>) -> Result<(), StateError> {
        tokio::task::yield_now().await;
        self.0.set(key, value, ttl).await
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        tokio::task::yield_now().await;
        self.0.delete(key).await
    }

    async fn get_fields(&self, key: &StateKey) -> Result<Option<FieldSet>, StateError> {
        tokio::task::yield_now().await;
        self.0.get_fields(key).await
    }

    async fn set_fields(
        &self,
        key: &StateKey,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<u64, StateError> {
        tokio::task::yield_now().await;
        self.0.set_fields(key, fields, ttl).await
    }

    async fn compare_and_set_fields(
        &self,
        key: &StateKey,
        expected_version: u64,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        tokio::task::yield_now().await;
        self.0
            .compare_and_set_fields(key, expected_version, fields, ttl)
            .await
    }

    async fn scan_keys(&self, kind: KeyKind, prefix: Option<&str>) -> Result<Vec<String>, StateError> {
        tokio::task::yield_now().await;
        self.0.scan_keys(kind, prefix).await
    }
}

#[tokio::test]
async fn burst_then_deny() {
    let (limiter, _, _) = setup(LimiterConfig::default());
    let tenant = TenantId::from("tenant_a");

    for expected_remaining in (0..10).rev() {
        let d = limiter.check_rate_limit(&tenant, &free()).await;
        assert!(d.admitted);
        assert_eq!(d.limit, 10);
        assert_eq!(d.remaining, expected_remaining);
        assert_eq!(d.retry_after_seconds, 0);
        assert_eq!(d.basis, DecisionBasis::Bucket);
    }

    let denied = limiter.check_rate_limit(&tenant, &free()).await;
    assert!(!denied.admitted);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.retry_after_seconds, 1);
    assert_eq!(denied.reset_time_ms, T0 + 1000);

    let snap = limiter.metrics().snapshot();
    assert_eq!(snap.checks, 11);
    assert_eq!(snap.admitted, 10);
    assert_eq!(snap.denied, 1);
    assert_eq!(snap.provisioned, 1);
}

#[tokio::test]
async fn partial_refill_admits_one() {
    let (limiter, clock, _) = setup(LimiterConfig::default());
    let tenant = TenantId::from("tenant_a");

    for _ in 0..10 {
        assert!(limiter.check_rate_limit(&tenant, &free()).await.admitted);
    }
    clock.advance(1500);

    let d = limiter.check_rate_limit(&tenant, &free()).await;
    assert!(d.admitted);
    assert_eq!(d.remaining, 0);
    // 0.5 tokens left, half a second to the next.
    assert_eq!(d.reset_time_ms, T0 + 1500 + 500);

    let d = limiter.check_rate_limit(&tenant, &free()).await;
    assert!(!d.admitted);
    assert_eq!(d.retry_after_seconds, 1);
}

#[tokio::test]
async fn long_idle_refills_to_capacity_only() {
    let (limiter, clock, _) = setup(LimiterConfig::default());
    let tenant = TenantId::from("tenant_a");

    for _ in 0..10 {
        limiter.check_rate_limit(&tenant, &free()).await;
    }
    clock.advance(10 * 60 * 1000);

    let d = limiter.check_rate_limit(&tenant, &free()).await;
    assert!(d.admitted);
    assert_eq!(d.remaining, 9);
}

#[tokio::test]
async fn tenants_have_independent_buckets() {
    let (limiter, _, _) = setup(LimiterConfig::default());
    let a = TenantId::from("tenant_a");
    let b = TenantId::from("tenant_b");

    for _ in 0..10 {
        limiter.check_rate_limit(&a, &free()).await;
    }
    assert!(!limiter.check_rate_limit(&a, &free()).await.admitted);

    let d = limiter.check_rate_limit(&b, &free()).await;
    assert!(d.admitted);
    assert_eq!(d.remaining, 9);
}

#[tokio::test]
async fn tier_change_reprovisions_bucket() {
    let (limiter, _, _) = setup(LimiterConfig::default());
    let tenant = TenantId::from("tenant_a");

    for _ in 0..10 {
        limiter.check_rate_limit(&tenant, &free()).await;
    }
    assert!(!limiter.check_rate_limit(&tenant, &free()).await.admitted);

    let enterprise = limits("enterprise", 6000, 100);
    let d = limiter.check_rate_limit(&tenant, &enterprise).await;
    assert!(d.admitted);
    assert_eq!(d.limit, 100);
    assert_eq!(d.remaining, 99);

    let bucket = limiter.peek_bucket(&tenant).await.unwrap().unwrap();
    assert_eq!(bucket.tier.as_str(), "enterprise");
    assert_eq!(limiter.metrics().snapshot().tier_resets, 1);
}

#[tokio::test]
async fn override_change_on_same_tier_reprovisions() {
    let (limiter, _, _) = setup(LimiterConfig::default());
    let tenant = TenantId::from("tenant_a");

    limiter.check_rate_limit(&tenant, &free()).await;
    let d = limiter.check_rate_limit(&tenant, &limits("free", 60, 25)).await;
    assert_eq!(d.limit, 25);
    assert_eq!(d.remaining, 24);
}

#[tokio::test]
async fn denied_check_does_not_write() {
    let (limiter, clock, store) = setup(LimiterConfig::default());
    let tenant = TenantId::from("tenant_a");

    for _ in 0..10 {
        limiter.check_rate_limit(&tenant, &free()).await;
    }
    let key = StateKey::rate_limit("tenant_a");
    let before = store.get_fields(&key).await.unwrap().unwrap();

    clock.advance(200);
    assert!(!limiter.check_rate_limit(&tenant, &free()).await.admitted);

    let after = store.get_fields(&key).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn clear_bucket_restores_full_burst() {
    let (limiter, _, _) = setup(LimiterConfig::default());
    let a = TenantId::from("tenant_a");
    let b = TenantId::from("tenant_b");

    for _ in 0..10 {
        limiter.check_rate_limit(&a, &free()).await;
        limiter.check_rate_limit(&b, &free()).await;
    }

    assert!(limiter.clear_bucket(&a).await.unwrap());
    assert!(!limiter.clear_bucket(&a).await.unwrap());
    assert_eq!(limiter.check_rate_limit(&a, &free()).await.remaining, 9);

    assert_eq!(limiter.clear_all_buckets().await.unwrap(), 2);
    assert!(limiter.peek_bucket(&b).await.unwrap().is_none());
    assert_eq!(limiter.check_rate_limit(&b, &free()).await.remaining, 9);
}

#[tokio::test]
async fn peek_refills_without_consuming() {
    let (limiter, clock, _) = setup(LimiterConfig::default());
    let tenant = TenantId::from("tenant_a");

    assert!(limiter.peek_bucket(&tenant).await.unwrap().is_none());
    for _ in 0..5 {
        limiter.check_rate_limit(&tenant, &free()).await;
    }
    clock.advance(2000);

    let first = limiter.peek_bucket(&tenant).await.unwrap().unwrap();
    let second = limiter.peek_bucket(&tenant).await.unwrap().unwrap();
    assert_eq!(first.remaining(), 7);
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn idle_bucket_expires_after_ttl() {
    let config = LimiterConfig {
        bucket_ttl: Duration::from_secs(60),
        ..LimiterConfig::default()
    };
    let (limiter, _, _) = setup(config);
    let tenant = TenantId::from("tenant_a");

    for _ in 0..10 {
        limiter.check_rate_limit(&tenant, &free()).await;
    }
    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(limiter.peek_bucket(&tenant).await.unwrap().is_none());
}

#[tokio::test]
async fn atomic_mode_never_over_admits() {
    let store: Arc<dyn StateStore> = Arc::new(YieldingStore(MemoryStateStore::new()));
    let clock = Arc::new(ManualClock::new(T0));
    let limiter = limiter_with(
        store,
        clock,
        LimiterConfig {
            consistency: Consistency::Atomic,
            on_error: ErrorBehavior::Deny,
            max_cas_retries: 64,
            ..LimiterConfig::default()
        },
    );
    let tenant = TenantId::from("tenant_a");
    let limits = free();

    let checks = (0..50).map(|_| limiter.check_rate_limit(&tenant, &limits));
    let decisions = futures::future::join_all(checks).await;

    let admitted = decisions.iter().filter(|d| d.admitted).count();
    assert_eq!(admitted, 10);
    assert!(decisions.iter().all(|d| d.basis == DecisionBasis::Bucket));
    assert!(limiter.metrics().snapshot().cas_conflicts > 0);
}

#[tokio::test]
async fn approximate_mode_can_over_admit_under_races() {
    let store: Arc<dyn StateStore> = Arc::new(YieldingStore(MemoryStateStore::new()));
    let clock = Arc::new(ManualClock::new(T0));
    let limiter = limiter_with(store, clock, LimiterConfig::default());
    let tenant = TenantId::from("tenant_a");
    let limits = free();

    let checks = (0..20).map(|_| limiter.check_rate_limit(&tenant, &limits));
    let decisions = futures::future::join_all(checks).await;

    let admitted = decisions.iter().filter(|d| d.admitted).count();
    assert!(admitted > 10, "expected the documented race, got {admitted}");
}

#[tokio::test]
async fn atomic_mode_matches_sequential_behavior() {
    let (limiter, clock, _) = setup(LimiterConfig {
        consistency: Consistency::Atomic,
        ..LimiterConfig::default()
    });
    let tenant = TenantId::from("tenant_a");

    for expected_remaining in (0..10).rev() {
        let d = limiter.check_rate_limit(&tenant, &free()).await;
        assert!(d.admitted);
        assert_eq!(d.remaining, expected_remaining);
    }
    assert!(!limiter.check_rate_limit(&tenant, &free()).await.admitted);

    clock.advance(1000);
    assert!(limiter.check_rate_limit(&tenant, &free()).await.admitted);
    assert_eq!(limiter.metrics().snapshot().cas_conflicts, 0);
}
