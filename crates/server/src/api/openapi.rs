#![allow(clippy::needless_for_each)]

use utoipa::Modify;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};

use tollgate_core::TierProfile;

use super::schemas::{
    ApiDataResponse, ApiRootResponse, BucketResponse, ClearBucketsResponse, CreateTenantRequest,
    DeleteTenantResponse, DeletedTenant, ErrorResponse, HealthResponse, ListTenantsQuery,
    LiveResponse, MetricsResponse, NotFoundResponse, RateLimitedResponse, ReadyResponse,
    SampleData, TenantEnvelope, TenantList, TenantListFilters, TenantListResponse, TenantResponse,
    TierListResponse, UpdateTenantRequest,
};

/// Registers the `X-API-Key` header scheme used by the protected routes.
struct ApiKeyScheme;

impl Modify for ApiKeyScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "Tollgate API",
        version = "0.1.0",
        description = "Multi-tenant admission control: per-tenant token-bucket rate limiting, tenant management, and bucket inspection.",
        license(name = "MIT")
    ),
    modifiers(&ApiKeyScheme),
    tags(
        (name = "Health", description = "Service health and metrics"),
        (name = "Tenants", description = "Tenant registration and management"),
        (name = "Tiers", description = "Configured rate-limit tiers"),
        (name = "Buckets", description = "Token bucket inspection and reset"),
        (name = "Protected", description = "Sample endpoints behind admission control")
    ),
    paths(
        super::health::health,
        super::health::ready,
        super::health::live,
        super::health::metrics,
        super::tenants::create_tenant,
        super::tenants::list_tenants,
        super::tenants::get_tenant,
        super::tenants::update_tenant,
        super::tenants::delete_tenant,
        super::tiers::list_tiers,
        super::buckets::get_bucket,
        super::buckets::clear_bucket,
        super::buckets::clear_all_buckets,
        super::protected::root,
        super::protected::data,
    ),
    components(schemas(
        HealthResponse, ReadyResponse, LiveResponse, MetricsResponse,
        ErrorResponse, NotFoundResponse, RateLimitedResponse,
        CreateTenantRequest, UpdateTenantRequest, ListTenantsQuery,
        TenantResponse, TenantEnvelope, TenantList, TenantListFilters, TenantListResponse,
        DeletedTenant, DeleteTenantResponse,
        TierProfile, TierListResponse,
        BucketResponse, ClearBucketsResponse,
        ApiRootResponse, ApiDataResponse, SampleData,
    ))
)]
pub struct ApiDoc;
