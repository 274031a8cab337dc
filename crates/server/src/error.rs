use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tollgate_limiter::LimiterError;

/// Errors that can occur when running the Tollgate server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A limiter or tenant directory error surfaced through the API.
    #[error(transparent)]
    Limiter(#[from] LimiterError),

    /// The request body or parameters were rejected.
    #[error("{0}")]
    BadRequest(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Limiter(e) => match e {
                LimiterError::Validation(_) => StatusCode::BAD_REQUEST,
                LimiterError::TenantNotFound(_) => StatusCode::NOT_FOUND,
                LimiterError::StoreUnavailable { .. } | LimiterError::Contention { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                LimiterError::ApiKeyCollision(_)
                | LimiterError::Corrupt { .. }
                | LimiterError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        error_response(status, &self.to_string())
    }
}

/// JSON error body shared by handlers and the admission layer.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({
        "error": status.canonical_reason().unwrap_or("Error"),
        "message": message,
    });
    (status, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use tollgate_core::{TenantId, ValidationError};
    use tollgate_state::StateError;

    use super::*;

    #[test]
    fn limiter_errors_map_to_http_status() {
        let cases = [
            (
                ServerError::from(LimiterError::Validation(ValidationError::EmptyCatalog)),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServerError::from(LimiterError::TenantNotFound(TenantId::from("t"))),
                StatusCode::NOT_FOUND,
            ),
            (
                ServerError::from(LimiterError::store(
                    "load",
                    StateError::Connection("down".into()),
                )),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServerError::from(LimiterError::ApiKeyCollision(5)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServerError::BadRequest("nope".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
