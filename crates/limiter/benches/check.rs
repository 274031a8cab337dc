use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use tollgate_core::{EffectiveLimits, TenantId, TierName};
use tollgate_limiter::{Consistency, LimiterConfig, RateLimiter, RateLimiterBuilder};
use tollgate_state_memory::MemoryStateStore;

fn limiter(consistency: Consistency) -> RateLimiter {
    RateLimiterBuilder::new()
        .store(Arc::new(MemoryStateStore::new()))
        .config(LimiterConfig {
            consistency,
            ..LimiterConfig::default()
        })
        .build()
        .expect("limiter should build")
}

fn enterprise() -> EffectiveLimits {
    EffectiveLimits {
        tier: TierName::from("enterprise"),
        requests_per_minute: 6000,
        burst_capacity: 100,
    }
}

fn bench_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    let limits = enterprise();

    for (name, consistency) in [
        ("check_approximate", Consistency::Approximate),
        ("check_atomic", Consistency::Atomic),
    ] {
        let limiter = limiter(consistency);
        let tenant = TenantId::from("tenant_bench");
        c.bench_function(name, |b| {
            b.to_async(&rt)
                .iter(|| async { black_box(limiter.check_rate_limit(&tenant, &limits).await) });
        });
    }
}

fn bench_many_tenants(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    let limiter = limiter(Consistency::Approximate);
    let limits = enterprise();
    let tenants: Vec<TenantId> = (0..1000)
        .map(|i| TenantId::from(format!("tenant_{i}")))
        .collect();

    c.bench_function("check_1000_tenants", |b| {
        b.to_async(&rt).iter(|| async {
            for tenant in &tenants {
                black_box(limiter.check_rate_limit(tenant, &limits).await);
            }
        });
    });
}

criterion_group!(benches, bench_check, bench_many_tenants);
criterion_main!(benches);
