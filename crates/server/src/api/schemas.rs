use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use tollgate_core::{Bucket, TenantProfile, TierName, TierProfile};
use tollgate_limiter::directory::mask_api_key;
use tollgate_limiter::{MetricsSnapshot, TenantUpdate};

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[schema(example = "0.1.0")]
    pub version: String,
}

/// Readiness check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadyResponse {
    #[schema(example = "ready")]
    pub status: String,
    /// `connected` or `unavailable`.
    #[schema(example = "connected")]
    pub store: String,
}

/// Liveness check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LiveResponse {
    #[schema(example = "alive")]
    pub status: String,
    pub uptime_seconds: u64,
}

/// Admission counters since process start.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsResponse {
    /// Admission checks performed.
    #[schema(example = 1042)]
    pub checks: u64,
    #[schema(example = 1000)]
    pub admitted: u64,
    #[schema(example = 42)]
    pub denied: u64,
    /// Buckets created at full capacity.
    pub provisioned: u64,
    /// Buckets reset because the tenant's limits changed.
    pub tier_resets: u64,
    /// Stored buckets that failed to decode and were replaced.
    pub corrupt_records: u64,
    /// Compare-and-set conflicts retried in atomic mode.
    pub cas_conflicts: u64,
    /// Requests admitted because the store was unavailable.
    pub fail_open: u64,
    /// Requests refused because the store was unavailable.
    pub fail_closed: u64,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(snap: MetricsSnapshot) -> Self {
        Self {
            checks: snap.checks,
            admitted: snap.admitted,
            denied: snap.denied,
            provisioned: snap.provisioned,
            tier_resets: snap.tier_resets,
            corrupt_records: snap.corrupt_records,
            cas_conflicts: snap.cas_conflicts,
            fail_open: snap.fail_open,
            fail_closed: snap.fail_closed,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Bad Request")]
    pub error: String,
    #[schema(example = "invalid name: name must be at least 3 characters")]
    pub message: String,
}

/// Body returned for unknown routes.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotFoundResponse {
    #[schema(example = "not found")]
    pub error: String,
    #[schema(example = "/v2/unknown")]
    pub path: String,
    #[schema(example = "GET")]
    pub method: String,
}

/// Body returned with a 429.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RateLimitedResponse {
    #[schema(example = "Too Many Requests")]
    pub error: String,
    pub message: String,
    #[schema(example = 10)]
    pub limit: u64,
    #[schema(example = 0)]
    pub remaining: u64,
    /// Seconds to wait before retrying.
    #[schema(example = 1)]
    pub retry_after: u64,
    /// Epoch milliseconds at which the next token becomes available.
    pub reset_time: u64,
}

/// Request body for `POST /v1/tenants`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTenantRequest {
    #[schema(example = "Acme Corp")]
    pub name: String,
    #[serde(default)]
    #[schema(example = "ops@acme.test")]
    pub email: Option<String>,
    /// Defaults to `free`.
    #[serde(default)]
    #[schema(example = "premium")]
    pub tier: Option<String>,
}

/// Request body for `PUT /v1/tenants/{id}`. At least one field is required.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateTenantRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// An empty string clears the email.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    /// `0` clears the override.
    #[serde(default)]
    #[schema(example = 120)]
    pub custom_rpm: Option<u32>,
    /// `0` clears the override.
    #[serde(default)]
    #[schema(example = 20)]
    pub custom_burst: Option<u32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl From<UpdateTenantRequest> for TenantUpdate {
    fn from(req: UpdateTenantRequest) -> Self {
        Self {
            name: req.name,
            email: req.email,
            tier: req.tier.map(TierName::from),
            custom_rpm: req.custom_rpm,
            custom_burst: req.custom_burst,
            is_active: req.is_active,
        }
    }
}

/// Query parameters for `GET /v1/tenants`.
#[derive(Debug, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListTenantsQuery {
    /// Only tenants on this tier.
    pub tier: Option<String>,
    /// Only active (`true`) or inactive (`false`) tenants.
    pub active: Option<bool>,
}

/// A tenant as returned by the API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TenantResponse {
    #[schema(example = "tenant_0192f1c4a7b87c3e9d6b1f2a3c4d5e6f")]
    pub id: String,
    /// Full key on create, masked everywhere else.
    #[schema(example = "sk_live_****...9f3a")]
    pub api_key: String,
    pub name: String,
    pub email: Option<String>,
    #[schema(example = "free")]
    pub tier: String,
    pub is_active: bool,
    pub custom_rpm: Option<u32>,
    pub custom_burst: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantResponse {
    /// Include the full API key. Only used when the key is first issued.
    pub fn revealed(tenant: TenantProfile) -> Self {
        let api_key = tenant.api_key.clone();
        Self::with_key(tenant, api_key)
    }

    pub fn masked(tenant: TenantProfile) -> Self {
        let api_key = mask_api_key(&tenant.api_key);
        Self::with_key(tenant, api_key)
    }

    fn with_key(tenant: TenantProfile, api_key: String) -> Self {
        Self {
            id: tenant.id.to_string(),
            api_key,
            name: tenant.name,
            email: tenant.email,
            tier: tenant.tier.to_string(),
            is_active: tenant.is_active,
            custom_rpm: tenant.custom_rpm,
            custom_burst: tenant.custom_burst,
            created_at: tenant.created_at,
            updated_at: tenant.updated_at,
        }
    }
}

/// A single tenant, with a message on mutations.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TenantEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Tenant created successfully")]
    pub message: Option<String>,
    pub data: TenantResponse,
}

/// Filters echoed back by `GET /v1/tenants`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TenantListFilters {
    pub tier: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TenantList {
    pub tenants: Vec<TenantResponse>,
    pub total: usize,
    pub filters: TenantListFilters,
}

/// Response for `GET /v1/tenants`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TenantListResponse {
    pub data: TenantList,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedTenant {
    pub deleted_tenant_id: String,
}

/// Response for `DELETE /v1/tenants/{id}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteTenantResponse {
    #[schema(example = "Tenant deleted successfully")]
    pub message: String,
    pub data: DeletedTenant,
}

/// Response for `GET /v1/tiers`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TierListResponse {
    pub data: Vec<TierProfile>,
}

/// A tenant's bucket, refilled to the current time.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BucketResponse {
    pub tenant_id: String,
    #[schema(example = "free")]
    pub tier: String,
    #[schema(example = 10.0)]
    pub capacity: f64,
    #[schema(example = 7.5)]
    pub tokens: f64,
    /// Whole tokens available.
    #[schema(example = 7)]
    pub remaining: u64,
    pub refill_rate_per_ms: f64,
    /// Epoch milliseconds of the last refill.
    pub last_refill_at: u64,
}

impl BucketResponse {
    pub fn new(tenant_id: String, bucket: &Bucket) -> Self {
        Self {
            tenant_id,
            tier: bucket.tier.to_string(),
            capacity: bucket.capacity,
            tokens: bucket.tokens,
            remaining: bucket.remaining(),
            refill_rate_per_ms: bucket.refill_rate_per_ms,
            last_refill_at: bucket.last_refill_at,
        }
    }
}

/// Response for bucket resets.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearBucketsResponse {
    #[schema(example = "All rate limit buckets cleared successfully")]
    pub message: String,
    /// Number of buckets removed.
    pub removed: usize,
}

/// Response for `GET /api`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiRootResponse {
    #[schema(example = "API root endpoint")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SampleData {
    pub sample: String,
    pub timestamp: DateTime<Utc>,
}

/// Response for `GET /api/data`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiDataResponse {
    #[schema(example = "Success")]
    pub message: String,
    /// Absent when the request was admitted without tenant resolution.
    pub tier: Option<String>,
    pub data: SampleData,
}
