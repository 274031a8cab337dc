use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::warn;

use super::AppState;
use super::schemas::{HealthResponse, LiveResponse, MetricsResponse, ReadyResponse};

/// Upper bound on the readiness check's store round trip.
const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// `GET /health` -- basic process status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    summary = "Health check",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// `GET /health/ready` -- succeeds only when the shared store answers.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    summary = "Readiness check",
    description = "Pings the shared state store.",
    responses(
        (status = 200, description = "Store reachable", body = ReadyResponse),
        (status = 503, description = "Store unreachable", body = ReadyResponse)
    )
)]
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let reachable = match tokio::time::timeout(READY_TIMEOUT, state.store.health_check()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "readiness check failed");
            false
        }
        Err(_) => {
            warn!("readiness check timed out");
            false
        }
    };

    let (status, body) = if reachable {
        (StatusCode::OK, ReadyResponse {
            status: "ready".into(),
            store: "connected".into(),
        })
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, ReadyResponse {
            status: "not_ready".into(),
            store: "unavailable".into(),
        })
    };
    (status, Json(body))
}

/// `GET /health/live` -- process liveness and uptime.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    summary = "Liveness check",
    responses(
        (status = 200, description = "Process is alive", body = LiveResponse)
    )
)]
pub async fn live(State(state): State<AppState>) -> impl IntoResponse {
    Json(LiveResponse {
        status: "alive".into(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// `GET /metrics` -- admission counters as JSON.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    summary = "Admission metrics",
    description = "Returns admission counters since process start.",
    responses(
        (status = 200, description = "Current metric counters", body = MetricsResponse)
    )
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(MetricsResponse::from(state.limiter.metrics().snapshot()))
}
