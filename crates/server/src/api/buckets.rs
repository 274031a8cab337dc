use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use tollgate_core::TenantId;

use super::AppState;
use super::schemas::{BucketResponse, ClearBucketsResponse, ErrorResponse};
use crate::error::{ServerError, error_response};

/// `GET /v1/buckets/{tenant_id}` -- inspect a bucket without consuming.
#[utoipa::path(
    get,
    path = "/v1/buckets/{tenant_id}",
    tag = "Buckets",
    summary = "Inspect bucket",
    params(("tenant_id" = String, Path, description = "Tenant ID")),
    responses(
        (status = 200, description = "Bucket refilled to now", body = BucketResponse),
        (status = 404, description = "No bucket (idle or never used)", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn get_bucket(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Response, ServerError> {
    let Some(bucket) = state.limiter.peek_bucket(&TenantId::from(tenant_id.as_str())).await? else {
        return Ok(error_response(
            StatusCode::NOT_FOUND,
            &format!("no bucket for tenant {tenant_id}"),
        ));
    };
    Ok(Json(BucketResponse::new(tenant_id, &bucket)).into_response())
}

/// `DELETE /v1/buckets/{tenant_id}` -- reset one tenant to a full bucket.
#[utoipa::path(
    delete,
    path = "/v1/buckets/{tenant_id}",
    tag = "Buckets",
    summary = "Clear bucket",
    params(("tenant_id" = String, Path, description = "Tenant ID")),
    responses(
        (status = 200, description = "Bucket cleared", body = ClearBucketsResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn clear_bucket(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let removed = state.limiter.clear_bucket(&TenantId::from(tenant_id)).await?;
    Ok(Json(ClearBucketsResponse {
        message: "Rate limit bucket cleared successfully".into(),
        removed: usize::from(removed),
    }))
}

/// `DELETE /v1/buckets` -- reset every tenant.
#[utoipa::path(
    delete,
    path = "/v1/buckets",
    tag = "Buckets",
    summary = "Clear all buckets",
    responses(
        (status = 200, description = "Buckets cleared", body = ClearBucketsResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn clear_all_buckets(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let removed = state.limiter.clear_all_buckets().await?;
    Ok(Json(ClearBucketsResponse {
        message: "All rate limit buckets cleared successfully".into(),
        removed,
    }))
}
