use thiserror::Error;

/// Configuration-time validation failures.
///
/// These are raised when a tier catalog is built or a tenant record is
/// created or updated. The decision path only ever sees limits that already
/// passed these checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid tier: {tier} (must be one of: {known})")]
    UnknownTier { tier: String, known: String },

    #[error("tier {tier} has invalid limits: {reason}")]
    InvalidTierLimits { tier: String, reason: String },

    #[error("tier catalog must define at least one tier")]
    EmptyCatalog,

    #[error("{field} must be between 0 and {max}, got {value}")]
    OverrideOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
