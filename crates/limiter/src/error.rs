use thiserror::Error;

use tollgate_core::{TenantId, ValidationError};
use tollgate_state::StateError;

/// Errors raised by the limiter, the bucket store, and the tenant directory.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// The shared store failed or did not answer in time.
    #[error("store unavailable during {operation}: {source}")]
    StoreUnavailable {
        operation: &'static str,
        #[source]
        source: StateError,
    },

    /// Concurrent writers kept winning the compare-and-set race.
    #[error("bucket for {tenant_id} still contended after {attempts} attempts")]
    Contention { tenant_id: TenantId, attempts: u32 },

    /// No tenant with this id exists.
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),

    /// Input rejected by tier or tenant validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Every generated API key collided with an existing one.
    #[error("failed to generate a unique API key after {0} attempts")]
    ApiKeyCollision(u32),

    /// A stored record could not be decoded.
    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// The limiter was assembled without a required component.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LimiterError {
    /// Wrap a store failure for `operation`.
    pub fn store(operation: &'static str, source: StateError) -> Self {
        Self::StoreUnavailable { operation, source }
    }

    /// Whether this is an infrastructure failure rather than a caller error.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::Contention { .. } | Self::Corrupt { .. }
        )
    }
}
