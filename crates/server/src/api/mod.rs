pub mod buckets;
pub mod health;
pub mod openapi;
pub mod protected;
pub mod schemas;
pub mod tenants;
pub mod tiers;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::{Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tollgate_core::TierCatalog;
use tollgate_limiter::{
    LimiterConfig, RateLimiter, RateLimiterBuilder, StoreTenantDirectory, TenantResolver,
};
use tollgate_state::StateStore;

use self::openapi::ApiDoc;
use self::schemas::NotFoundResponse;
use crate::admission::AdmissionLayer;
use crate::error::ServerError;

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub catalog: Arc<TierCatalog>,
    pub directory: Arc<StoreTenantDirectory>,
    pub resolver: Arc<TenantResolver>,
    pub limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the directory, resolver, and limiter over one shared store.
    pub fn new(
        store: Arc<dyn StateStore>,
        catalog: TierCatalog,
        config: LimiterConfig,
    ) -> Result<Self, ServerError> {
        let limiter = RateLimiterBuilder::new()
            .store(Arc::clone(&store))
            .config(config)
            .build()?;
        Ok(Self::with_limiter(store, catalog, limiter))
    }

    /// Like [`AppState::new`] with a pre-built limiter (custom clock, shared
    /// metrics).
    pub fn with_limiter(
        store: Arc<dyn StateStore>,
        catalog: TierCatalog,
        limiter: RateLimiter,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let directory = Arc::new(StoreTenantDirectory::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
        ));
        let resolver = Arc::new(TenantResolver::new(
            Arc::<StoreTenantDirectory>::clone(&directory),
            Arc::clone(&catalog),
            limiter.config().store_timeout,
        ));
        Self {
            store,
            catalog,
            directory,
            resolver,
            limiter: Arc::new(limiter),
            started_at: Instant::now(),
        }
    }
}

/// Build the Axum router with all API routes, middleware, and Swagger UI.
pub fn router(state: AppState) -> Router {
    let admission = AdmissionLayer::new(Arc::clone(&state.resolver), Arc::clone(&state.limiter));

    let protected = Router::new()
        .route("/api", get(protected::root))
        .route("/api/data", get(protected::data))
        .layer(admission);

    Router::new()
        // Health & metrics
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(health::metrics))
        // Tenant management
        .route(
            "/v1/tenants",
            post(tenants::create_tenant).get(tenants::list_tenants),
        )
        .route(
            "/v1/tenants/{id}",
            get(tenants::get_tenant)
                .put(tenants::update_tenant)
                .delete(tenants::delete_tenant),
        )
        .route("/v1/tiers", get(tiers::list_tiers))
        // Buckets
        .route("/v1/buckets", delete(buckets::clear_all_buckets))
        .route(
            "/v1/buckets/{tenant_id}",
            get(buckets::get_bucket).delete(buckets::clear_bucket),
        )
        .merge(protected)
        .fallback(not_found)
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    debug!(%method, path = %uri.path(), "no route");
    (
        StatusCode::NOT_FOUND,
        axum::Json(NotFoundResponse {
            error: "not found".to_owned(),
            path: uri.path().to_owned(),
            method: method.to_string(),
        }),
    )
}
