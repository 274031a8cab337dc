use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::tier::TierCatalog;
use crate::types::{TenantId, TierName};

/// Upper bound for a per-tenant requests-per-minute override.
pub const MAX_CUSTOM_RPM: u32 = 10_000;

/// Upper bound for a per-tenant burst override.
pub const MAX_CUSTOM_BURST: u32 = 1_000;

/// A tenant as stored by the tenant directory.
///
/// The rate limiter treats this as read-only input for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TenantProfile {
    pub id: TenantId,
    pub api_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub tier: TierName,
    #[serde(default)]
    pub custom_rpm: Option<u32>,
    #[serde(default)]
    pub custom_burst: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantProfile {
    /// Compute the limits this tenant is actually held to.
    ///
    /// Each override replaces the tier default independently, and only when
    /// it is in `1..=MAX`. The tier itself must exist in `catalog`.
    pub fn effective_limits(&self, catalog: &TierCatalog) -> Result<EffectiveLimits, ValidationError> {
        let tier = catalog.require(&self.tier)?;
        let requests_per_minute = self
            .custom_rpm
            .filter(|rpm| (1..=MAX_CUSTOM_RPM).contains(rpm))
            .unwrap_or(tier.requests_per_minute);
        let burst_capacity = self
            .custom_burst
            .filter(|burst| (1..=MAX_CUSTOM_BURST).contains(burst))
            .unwrap_or(tier.burst_capacity);

        Ok(EffectiveLimits {
            tier: tier.name.clone(),
            requests_per_minute,
            burst_capacity,
        })
    }
}

/// Limits applied to one tenant's bucket after overrides are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EffectiveLimits {
    pub tier: TierName,
    pub requests_per_minute: u32,
    pub burst_capacity: u32,
}

impl EffectiveLimits {
    /// Tokens accrued per millisecond.
    #[must_use]
    pub fn refill_rate_per_ms(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60_000.0
    }

    #[must_use]
    pub fn capacity(&self) -> f64 {
        f64::from(self.burst_capacity)
    }
}

/// Validate a requested RPM override. `0` is accepted and means "no override".
pub fn validate_custom_rpm(value: u32) -> Result<(), ValidationError> {
    if value > MAX_CUSTOM_RPM {
        return Err(ValidationError::OverrideOutOfRange {
            field: "custom_rpm",
            value,
            max: MAX_CUSTOM_RPM,
        });
    }
    Ok(())
}

/// Validate a requested burst override. `0` is accepted and means "no override".
pub fn validate_custom_burst(value: u32) -> Result<(), ValidationError> {
    if value > MAX_CUSTOM_BURST {
        return Err(ValidationError::OverrideOutOfRange {
            field: "custom_burst",
            value,
            max: MAX_CUSTOM_BURST,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(tier: &str, custom_rpm: Option<u32>, custom_burst: Option<u32>) -> TenantProfile {
        let now = Utc::now();
        TenantProfile {
            id: TenantId::from("tenant_1"),
            api_key: "sk_live_abc".to_owned(),
            name: "Acme".to_owned(),
            email: None,
            tier: TierName::from(tier),
            custom_rpm,
            custom_burst,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn tier_defaults_without_overrides() {
        let catalog = TierCatalog::default();
        let limits = tenant("premium", None, None)
            .effective_limits(&catalog)
            .unwrap();
        assert_eq!(limits.tier.as_str(), "premium");
        assert_eq!(limits.requests_per_minute, 600);
        assert_eq!(limits.burst_capacity, 30);
    }

    #[test]
    fn overrides_apply_independently() {
        let catalog = TierCatalog::default();
        let limits = tenant("free", Some(120), None)
            .effective_limits(&catalog)
            .unwrap();
        assert_eq!(limits.requests_per_minute, 120);
        assert_eq!(limits.burst_capacity, 10);

        let limits = tenant("free", None, Some(25))
            .effective_limits(&catalog)
            .unwrap();
        assert_eq!(limits.requests_per_minute, 60);
        assert_eq!(limits.burst_capacity, 25);
    }

    #[test]
    fn out_of_range_overrides_fall_back_to_tier() {
        let catalog = TierCatalog::default();
        let limits = tenant("free", Some(0), Some(MAX_CUSTOM_BURST + 1))
            .effective_limits(&catalog)
            .unwrap();
        assert_eq!(limits.requests_per_minute, 60);
        assert_eq!(limits.burst_capacity, 10);
    }

    #[test]
    fn unknown_tier_is_an_error() {
        let catalog = TierCatalog::default();
        let err = tenant("gold", None, None)
            .effective_limits(&catalog)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownTier { .. }));
    }

    #[test]
    fn refill_rate_is_per_millisecond() {
        let limits = EffectiveLimits {
            tier: TierName::from("free"),
            requests_per_minute: 60,
            burst_capacity: 10,
        };
        assert!((limits.refill_rate_per_ms() - 0.001).abs() < f64::EPSILON);
        assert!((limits.capacity() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn override_validation_bounds() {
        assert!(validate_custom_rpm(0).is_ok());
        assert!(validate_custom_rpm(MAX_CUSTOM_RPM).is_ok());
        assert!(validate_custom_rpm(MAX_CUSTOM_RPM + 1).is_err());
        assert!(validate_custom_burst(MAX_CUSTOM_BURST).is_ok());
        assert!(validate_custom_burst(MAX_CUSTOM_BURST + 1).is_err());
    }
}
