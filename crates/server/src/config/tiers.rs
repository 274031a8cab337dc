use std::collections::BTreeMap;

use serde::Deserialize;

use tollgate_core::{TierCatalog, TierProfile, ValidationError};

/// One `[tiers.<name>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct TierConfig {
    pub requests_per_minute: u32,
    pub burst_capacity: u32,
    #[serde(default)]
    pub description: Option<String>,
}

/// Build the tier catalog from `[tiers.*]`, or the stock catalog when none
/// are configured.
pub fn build_catalog(tiers: &BTreeMap<String, TierConfig>) -> Result<TierCatalog, ValidationError> {
    if tiers.is_empty() {
        return Ok(TierCatalog::default());
    }
    let profiles = tiers
        .iter()
        .map(|(name, tier)| {
            let profile = TierProfile::new(name.as_str(), tier.requests_per_minute, tier.burst_capacity)?;
            Ok(match &tier.description {
                Some(description) => profile.with_description(description.clone()),
                None => profile,
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;
    TierCatalog::new(profiles)
}
