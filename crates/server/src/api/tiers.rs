use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use super::AppState;
use super::schemas::TierListResponse;

/// `GET /v1/tiers` -- the configured tier catalog.
#[utoipa::path(
    get,
    path = "/v1/tiers",
    tag = "Tiers",
    summary = "List tiers",
    responses(
        (status = 200, description = "Configured tiers", body = TierListResponse)
    )
)]
pub async fn list_tiers(State(state): State<AppState>) -> impl IntoResponse {
    Json(TierListResponse {
        data: state.catalog.iter().cloned().collect(),
    })
}
