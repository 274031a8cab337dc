//! Sample endpoints behind the admission layer.

use axum::Extension;
use axum::Json;
use axum::response::IntoResponse;

use super::schemas::{ApiDataResponse, ApiRootResponse, ErrorResponse, RateLimitedResponse, SampleData};
use crate::admission::AuthenticatedTenant;

/// `GET /api`
#[utoipa::path(
    get,
    path = "/api",
    tag = "Protected",
    summary = "API root",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Admitted", body = ApiRootResponse),
        (status = 401, description = "Missing or unknown API key", body = ErrorResponse),
        (status = 403, description = "Tenant deactivated", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitedResponse)
    )
)]
pub async fn root() -> impl IntoResponse {
    Json(ApiRootResponse {
        message: "API root endpoint".into(),
    })
}

/// `GET /api/data` -- sample payload tagged with the caller's tier.
#[utoipa::path(
    get,
    path = "/api/data",
    tag = "Protected",
    summary = "Sample data",
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Admitted", body = ApiDataResponse),
        (status = 401, description = "Missing or unknown API key", body = ErrorResponse),
        (status = 403, description = "Tenant deactivated", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitedResponse)
    )
)]
pub async fn data(tenant: Option<Extension<AuthenticatedTenant>>) -> impl IntoResponse {
    Json(ApiDataResponse {
        message: "Success".into(),
        tier: tenant.map(|Extension(AuthenticatedTenant(t))| t.limits.tier.to_string()),
        data: SampleData {
            sample: "This is protected data".into(),
            timestamp: chrono::Utc::now(),
        },
    })
}
