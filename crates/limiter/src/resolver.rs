use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use tollgate_core::{EffectiveLimits, TenantId, TenantProfile, TierCatalog};
use tollgate_state::StateError;

use crate::error::LimiterError;

/// Lookup of tenants by API key.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Find the tenant owning `api_key`. `None` if no tenant has it.
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<TenantProfile>, LimiterError>;
}

/// A tenant together with the limits it is held to right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTenant {
    pub profile: TenantProfile,
    pub limits: EffectiveLimits,
}

impl ResolvedTenant {
    pub fn tenant_id(&self) -> &TenantId {
        &self.profile.id
    }
}

/// Why an API key did not resolve to an admissible tenant.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No key was presented, or no tenant owns it.
    #[error("invalid or missing API key")]
    Unauthenticated,

    /// The tenant exists but has been deactivated.
    #[error("tenant {0} is inactive")]
    Inactive(TenantId),

    /// The directory could not answer, or returned an inconsistent record.
    #[error("tenant directory unavailable: {0}")]
    Unavailable(#[source] LimiterError),
}

/// Maps API keys to tenants and their effective limits.
pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
    catalog: Arc<TierCatalog>,
    timeout: Duration,
}

impl TenantResolver {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        catalog: Arc<TierCatalog>,
        timeout: Duration,
    ) -> Self {
        Self {
            directory,
            catalog,
            timeout,
        }
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    /// Resolve `api_key` to an active tenant and its limits.
    ///
    /// Inactive tenants are rejected here, before any bucket is touched. A
    /// tenant on a tier missing from the catalog is a directory
    /// inconsistency and reported as [`ResolveError::Unavailable`].
    #[instrument(name = "resolver.resolve", skip_all)]
    pub async fn resolve(&self, api_key: &str) -> Result<ResolvedTenant, ResolveError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ResolveError::Unauthenticated);
        }

        let lookup = tokio::time::timeout(self.timeout, self.directory.find_by_api_key(api_key));
        let profile = match lookup.await {
            Ok(Ok(Some(profile))) => profile,
            Ok(Ok(None)) => return Err(ResolveError::Unauthenticated),
            Ok(Err(e)) => return Err(ResolveError::Unavailable(e)),
            Err(_) => {
                return Err(ResolveError::Unavailable(LimiterError::store(
                    "resolve",
                    StateError::Timeout(self.timeout),
                )));
            }
        };

        if !profile.is_active {
            debug!(tenant_id = %profile.id, "rejecting inactive tenant");
            return Err(ResolveError::Inactive(profile.id));
        }

        let limits = profile.effective_limits(&self.catalog).map_err(|e| {
            warn!(tenant_id = %profile.id, tier = %profile.tier, error = %e, "tenant has a tier outside the catalog");
            ResolveError::Unavailable(LimiterError::Validation(e))
        })?;

        Ok(ResolvedTenant { profile, limits })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use tollgate_core::TierName;

    use super::*;

    struct FixedDirectory {
        tenants: HashMap<String, TenantProfile>,
    }

    #[async_trait]
    impl TenantDirectory for FixedDirectory {
        async fn find_by_api_key(
            &self,
            api_key: &str,
        ) -> Result<Option<TenantProfile>, LimiterError> {
            Ok(self.tenants.get(api_key).cloned())
        }
    }

    struct BrokenDirectory;

    #[async_trait]
    impl TenantDirectory for BrokenDirectory {
        async fn find_by_api_key(&self, _: &str) -> Result<Option<TenantProfile>, LimiterError> {
            Err(LimiterError::store(
                "find_by_api_key",
                StateError::Connection("refused".into()),
            ))
        }
    }

    fn profile(key: &str, tier: &str, active: bool, custom_rpm: Option<u32>) -> TenantProfile {
        let now = Utc::now();
        TenantProfile {
            id: TenantId::from(format!("tenant_{key}")),
            api_key: key.to_owned(),
            name: "Tenant".to_owned(),
            email: None,
            tier: TierName::from(tier),
            custom_rpm,
            custom_burst: None,
            is_active: active,
            created_at: now,
            updated_at: now,
        }
    }

    fn resolver(profiles: Vec<TenantProfile>) -> TenantResolver {
        let tenants = profiles
            .into_iter()
            .map(|p| (p.api_key.clone(), p))
            .collect();
        TenantResolver::new(
            Arc::new(FixedDirectory { tenants }),
            Arc::new(TierCatalog::default()),
            Duration::from_millis(250),
        )
    }

    #[tokio::test]
    async fn resolves_active_tenant_with_overrides() {
        let r = resolver(vec![profile("k1", "free", true, Some(120))]);
        let resolved = r.resolve("k1").await.unwrap();
        assert_eq!(resolved.tenant_id().as_str(), "tenant_k1");
        assert_eq!(resolved.limits.requests_per_minute, 120);
        assert_eq!(resolved.limits.burst_capacity, 10);
    }

    #[tokio::test]
    async fn missing_or_unknown_key_is_unauthenticated() {
        let r = resolver(vec![profile("k1", "free", true, None)]);
        assert!(matches!(r.resolve("").await, Err(ResolveError::Unauthenticated)));
        assert!(matches!(r.resolve("   ").await, Err(ResolveError::Unauthenticated)));
        assert!(matches!(r.resolve("nope").await, Err(ResolveError::Unauthenticated)));
    }

    #[tokio::test]
    async fn inactive_tenant_is_rejected() {
        let r = resolver(vec![profile("k1", "premium", false, None)]);
        match r.resolve("k1").await {
            Err(ResolveError::Inactive(id)) => assert_eq!(id.as_str(), "tenant_k1"),
            other => panic!("expected Inactive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tier_is_unavailable() {
        let r = resolver(vec![profile("k1", "platinum", true, None)]);
        assert!(matches!(r.resolve("k1").await, Err(ResolveError::Unavailable(_))));
    }

    #[tokio::test]
    async fn directory_failure_is_unavailable() {
        let r = TenantResolver::new(
            Arc::new(BrokenDirectory),
            Arc::new(TierCatalog::default()),
            Duration::from_millis(250),
        );
        assert!(matches!(r.resolve("k1").await, Err(ResolveError::Unavailable(_))));
    }
}
