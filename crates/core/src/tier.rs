use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::tenant::EffectiveLimits;
use crate::types::TierName;

/// Default limits and burst size for a named subscription tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TierProfile {
    /// Tier name, e.g. `"free"`.
    #[cfg_attr(feature = "openapi", schema(example = "free"))]
    pub name: TierName,
    /// Steady-state refill rate.
    #[cfg_attr(feature = "openapi", schema(example = 60))]
    pub requests_per_minute: u32,
    /// Maximum tokens a bucket of this tier can hold.
    #[cfg_attr(feature = "openapi", schema(example = 10))]
    pub burst_capacity: u32,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TierProfile {
    /// Build a tier, rejecting zero rates or capacities.
    pub fn new(
        name: impl Into<TierName>,
        requests_per_minute: u32,
        burst_capacity: u32,
    ) -> Result<Self, ValidationError> {
        let profile = Self {
            name: name.into(),
            requests_per_minute,
            burst_capacity,
            description: None,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the `requests_per_minute > 0 && burst_capacity > 0` invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidTierLimits {
                tier: self.name.to_string(),
                reason: "tier name must not be empty".to_owned(),
            });
        }
        if self.requests_per_minute == 0 {
            return Err(ValidationError::InvalidTierLimits {
                tier: self.name.to_string(),
                reason: "requests_per_minute must be greater than 0".to_owned(),
            });
        }
        if self.burst_capacity == 0 {
            return Err(ValidationError::InvalidTierLimits {
                tier: self.name.to_string(),
                reason: "burst_capacity must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }

    /// Limits for a tenant on this tier with no custom overrides.
    #[must_use]
    pub fn limits(&self) -> EffectiveLimits {
        EffectiveLimits {
            tier: self.name.clone(),
            requests_per_minute: self.requests_per_minute,
            burst_capacity: self.burst_capacity,
        }
    }
}

/// Immutable set of tiers, built once at startup and shared by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierCatalog {
    tiers: BTreeMap<TierName, TierProfile>,
}

impl TierCatalog {
    /// Build a catalog from tier profiles.
    ///
    /// Every profile is validated; duplicate names and an empty catalog are
    /// rejected.
    pub fn new(profiles: impl IntoIterator<Item = TierProfile>) -> Result<Self, ValidationError> {
        let mut tiers = BTreeMap::new();
        for profile in profiles {
            profile.validate()?;
            let name = profile.name.clone();
            if tiers.insert(name.clone(), profile).is_some() {
                return Err(ValidationError::InvalidTierLimits {
                    tier: name.to_string(),
                    reason: "tier defined more than once".to_owned(),
                });
            }
        }
        if tiers.is_empty() {
            return Err(ValidationError::EmptyCatalog);
        }
        Ok(Self { tiers })
    }

    /// Look up a tier by name.
    pub fn get(&self, name: &str) -> Option<&TierProfile> {
        self.tiers.get(name)
    }

    /// Look up a tier by name, failing with [`ValidationError::UnknownTier`].
    pub fn require(&self, name: &str) -> Result<&TierProfile, ValidationError> {
        self.get(name).ok_or_else(|| ValidationError::UnknownTier {
            tier: name.to_owned(),
            known: self.names().collect::<Vec<_>>().join(", "),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tiers.contains_key(name)
    }

    /// Tier names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(TierName::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TierProfile> {
        self.tiers.values()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl Default for TierCatalog {
    /// The stock `free` / `premium` / `enterprise` catalog.
    fn default() -> Self {
        let tiers = [
            ("free", 60, 10, "Free tier with basic rate limits"),
            ("premium", 600, 30, "Premium tier with increased rate limits"),
            ("enterprise", 6000, 100, "Enterprise tier with highest rate limits"),
        ];
        Self {
            tiers: tiers
                .into_iter()
                .map(|(name, rpm, burst, description)| {
                    let profile = TierProfile {
                        name: TierName::from(name),
                        requests_per_minute: rpm,
                        burst_capacity: burst,
                        description: Some(description.to_owned()),
                    };
                    (profile.name.clone(), profile)
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_three_tiers() {
        let catalog = TierCatalog::default();
        assert_eq!(catalog.len(), 3);

        let free = catalog.get("free").unwrap();
        assert_eq!(free.requests_per_minute, 60);
        assert_eq!(free.burst_capacity, 10);

        let premium = catalog.get("premium").unwrap();
        assert_eq!(premium.requests_per_minute, 600);
        assert_eq!(premium.burst_capacity, 30);

        let enterprise = catalog.get("enterprise").unwrap();
        assert_eq!(enterprise.requests_per_minute, 6000);
        assert_eq!(enterprise.burst_capacity, 100);
    }

    #[test]
    fn names_are_sorted() {
        let catalog = TierCatalog::default();
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(names, vec!["enterprise", "free", "premium"]);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let err = TierProfile::new("broken", 0, 10).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTierLimits { .. }));
    }

    #[test]
    fn zero_burst_is_rejected() {
        let err = TierProfile::new("broken", 10, 0).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTierLimits { .. }));
    }

    #[test]
    fn duplicate_tiers_are_rejected() {
        let a = TierProfile::new("gold", 10, 5).unwrap();
        let b = TierProfile::new("gold", 20, 5).unwrap();
        assert!(TierCatalog::new([a, b]).is_err());
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert_eq!(
            TierCatalog::new(Vec::new()).unwrap_err(),
            ValidationError::EmptyCatalog
        );
    }

    #[test]
    fn require_reports_known_tiers() {
        let catalog = TierCatalog::default();
        let err = catalog.require("platinum").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid tier: platinum (must be one of: enterprise, free, premium)"
        );
    }

    #[test]
    fn tier_limits_carry_name() {
        let tier = TierProfile::new("gold", 120, 20).unwrap();
        let limits = tier.limits();
        assert_eq!(limits.tier.as_str(), "gold");
        assert_eq!(limits.requests_per_minute, 120);
        assert_eq!(limits.burst_capacity, 20);
    }
}
