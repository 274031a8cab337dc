pub mod bucket;
pub mod decision;
pub mod error;
pub mod tenant;
pub mod tier;
pub mod types;

pub use bucket::Bucket;
pub use decision::{Decision, DecisionBasis};
pub use error::ValidationError;
pub use tenant::{
    EffectiveLimits, MAX_CUSTOM_BURST, MAX_CUSTOM_RPM, TenantProfile, validate_custom_burst,
    validate_custom_rpm,
};
pub use tier::{TierCatalog, TierProfile};
pub use types::{TenantId, TierName};
