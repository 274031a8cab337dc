//! Admission decisions for Tollgate.
//!
//! The [`RateLimiter`] turns a tenant's effective limits into an admit/deny
//! [`Decision`](tollgate_core::Decision) using a token bucket persisted in a
//! shared [`StateStore`](tollgate_state::StateStore). The
//! [`TenantResolver`] maps API keys to tenants and their limits, and
//! [`StoreTenantDirectory`] is the store-backed tenant registry it reads from.

pub mod bucket_store;
pub mod builder;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod resolver;

pub use bucket_store::{BucketStore, LoadedBucket};
pub use builder::RateLimiterBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Consistency, ErrorBehavior, LimiterConfig};
pub use directory::{NewTenant, StoreTenantDirectory, TenantFilter, TenantUpdate};
pub use error::LimiterError;
pub use limiter::RateLimiter;
pub use metrics::{LimiterMetrics, MetricsSnapshot};
pub use resolver::{ResolveError, ResolvedTenant, TenantDirectory, TenantResolver};
