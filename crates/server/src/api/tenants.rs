use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use tollgate_core::{TenantId, TierName};
use tollgate_limiter::{NewTenant, TenantFilter};

use super::AppState;
use super::schemas::{
    CreateTenantRequest, DeleteTenantResponse, DeletedTenant, ErrorResponse, ListTenantsQuery,
    TenantEnvelope, TenantList, TenantListFilters, TenantListResponse, TenantResponse,
    UpdateTenantRequest,
};
use crate::error::ServerError;

/// `POST /v1/tenants` -- register a tenant and issue its API key.
///
/// This is the only response that carries the full key.
#[utoipa::path(
    post,
    path = "/v1/tenants",
    tag = "Tenants",
    summary = "Create tenant",
    request_body = CreateTenantRequest,
    responses(
        (status = 201, description = "Tenant created", body = TenantEnvelope),
        (status = 400, description = "Invalid name, email, or tier", body = ErrorResponse)
    )
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(req): Json<CreateTenantRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let tenant = state
        .directory
        .create(NewTenant {
            name: req.name,
            email: req.email,
            tier: req.tier.map(TierName::from),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TenantEnvelope {
            message: Some("Tenant created successfully".into()),
            data: TenantResponse::revealed(tenant),
        }),
    ))
}

/// `GET /v1/tenants` -- list tenants, API keys masked.
#[utoipa::path(
    get,
    path = "/v1/tenants",
    tag = "Tenants",
    summary = "List tenants",
    params(ListTenantsQuery),
    responses(
        (status = 200, description = "Matching tenants", body = TenantListResponse),
        (status = 400, description = "Unknown tier filter", body = ErrorResponse)
    )
)]
pub async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<ListTenantsQuery>,
) -> Result<impl IntoResponse, ServerError> {
    if let Some(tier) = &query.tier {
        state.catalog.require(tier).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    }

    let filter = TenantFilter {
        tier: query.tier.clone().map(TierName::from),
        active: query.active,
    };
    let tenants: Vec<_> = state
        .directory
        .list(&filter)
        .await?
        .into_iter()
        .map(TenantResponse::masked)
        .collect();
    info!(count = tenants.len(), "listed tenants");

    Ok(Json(TenantListResponse {
        data: TenantList {
            total: tenants.len(),
            tenants,
            filters: TenantListFilters {
                tier: query.tier,
                active: query.active,
            },
        },
    }))
}

/// `GET /v1/tenants/{id}`
#[utoipa::path(
    get,
    path = "/v1/tenants/{id}",
    tag = "Tenants",
    summary = "Get tenant",
    params(("id" = String, Path, description = "Tenant ID")),
    responses(
        (status = 200, description = "Tenant found", body = TenantEnvelope),
        (status = 404, description = "No such tenant", body = ErrorResponse)
    )
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let tenant = state.directory.get(&TenantId::from(id)).await?;
    Ok(Json(TenantEnvelope {
        message: None,
        data: TenantResponse::masked(tenant),
    }))
}

/// `PUT /v1/tenants/{id}` -- partial update.
///
/// Tier and override changes apply from the tenant's next request.
#[utoipa::path(
    put,
    path = "/v1/tenants/{id}",
    tag = "Tenants",
    summary = "Update tenant",
    params(("id" = String, Path, description = "Tenant ID")),
    request_body = UpdateTenantRequest,
    responses(
        (status = 200, description = "Tenant updated", body = TenantEnvelope),
        (status = 400, description = "Empty or invalid update", body = ErrorResponse),
        (status = 404, description = "No such tenant", body = ErrorResponse)
    )
)]
pub async fn update_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTenantRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let tenant = state
        .directory
        .update(&TenantId::from(id), req.into())
        .await?;
    Ok(Json(TenantEnvelope {
        message: Some("Tenant updated successfully".into()),
        data: TenantResponse::masked(tenant),
    }))
}

/// `DELETE /v1/tenants/{id}` -- remove the tenant, its key, and its bucket.
#[utoipa::path(
    delete,
    path = "/v1/tenants/{id}",
    tag = "Tenants",
    summary = "Delete tenant",
    params(("id" = String, Path, description = "Tenant ID")),
    responses(
        (status = 200, description = "Tenant deleted", body = DeleteTenantResponse),
        (status = 404, description = "No such tenant", body = ErrorResponse)
    )
)]
pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let id = TenantId::from(id);
    state.directory.delete(&id).await?;
    state.limiter.clear_bucket(&id).await?;

    Ok(Json(DeleteTenantResponse {
        message: "Tenant deleted successfully".into(),
        data: DeletedTenant {
            deleted_tenant_id: id.to_string(),
        },
    }))
}
