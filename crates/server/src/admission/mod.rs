//! Per-request admission: API key authentication followed by a token-bucket
//! check for the resolved tenant.

mod middleware;

pub use middleware::{AdmissionLayer, AdmissionMiddleware};

use tollgate_limiter::ResolvedTenant;

/// Header carrying the tenant's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Epoch milliseconds at which the next token becomes available.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// The tenant an admitted request was made on behalf of.
///
/// Inserted into the request extensions by [`AdmissionLayer`]. Absent when
/// the tenant directory could not be reached and the request was let
/// through anyway.
#[derive(Debug, Clone)]
pub struct AuthenticatedTenant(pub ResolvedTenant);
