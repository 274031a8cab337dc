use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};
use tracing::{debug, warn};

use tollgate_core::decision::FAIL_CLOSED_RETRY_SECONDS;
use tollgate_core::{Decision, DecisionBasis};
use tollgate_limiter::{ErrorBehavior, RateLimiter, ResolveError, TenantResolver};

use super::{
    API_KEY_HEADER, AuthenticatedTenant, RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER,
    RATE_LIMIT_RESET_HEADER,
};
use crate::error::error_response;

/// Tower layer that authenticates the caller and enforces its rate limit.
#[derive(Clone)]
pub struct AdmissionLayer {
    resolver: Arc<TenantResolver>,
    limiter: Arc<RateLimiter>,
}

impl AdmissionLayer {
    pub fn new(resolver: Arc<TenantResolver>, limiter: Arc<RateLimiter>) -> Self {
        Self { resolver, limiter }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionMiddleware {
            inner,
            resolver: Arc::clone(&self.resolver),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Tower service produced by [`AdmissionLayer`].
#[derive(Clone)]
pub struct AdmissionMiddleware<S> {
    inner: S,
    resolver: Arc<TenantResolver>,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request<Body>> for AdmissionMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let resolver = Arc::clone(&self.resolver);
        let limiter = Arc::clone(&self.limiter);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let api_key = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned();

            let tenant = match resolver.resolve(&api_key).await {
                Ok(tenant) => tenant,
                Err(ResolveError::Unauthenticated) => {
                    let message = if api_key.trim().is_empty() {
                        "API key is required. Please provide X-API-Key header."
                    } else {
                        "Invalid API key"
                    };
                    debug!("rejecting unauthenticated request");
                    return Ok(error_response(StatusCode::UNAUTHORIZED, message));
                }
                Err(ResolveError::Inactive(tenant_id)) => {
                    debug!(tenant_id = %tenant_id, "rejecting inactive tenant");
                    return Ok(error_response(
                        StatusCode::FORBIDDEN,
                        "Your account has been deactivated. Please contact support.",
                    ));
                }
                Err(ResolveError::Unavailable(e)) => {
                    return match limiter.config().on_error {
                        ErrorBehavior::Allow => {
                            warn!(error = %e, "tenant directory unavailable, admitting request");
                            limiter.metrics().increment_fail_open();
                            inner.call(req).await
                        }
                        ErrorBehavior::Deny => {
                            warn!(error = %e, "tenant directory unavailable, refusing request");
                            limiter.metrics().increment_fail_closed();
                            Ok(unavailable_response(FAIL_CLOSED_RETRY_SECONDS))
                        }
                    };
                }
            };

            let decision = limiter
                .check_rate_limit(tenant.tenant_id(), &tenant.limits)
                .await;

            match decision.basis {
                DecisionBasis::Bucket if decision.admitted => {
                    debug!(
                        tenant_id = %tenant.tenant_id(),
                        remaining = decision.remaining,
                        "request admitted"
                    );
                    req.extensions_mut().insert(AuthenticatedTenant(tenant));
                    let mut response = inner.call(req).await?;
                    insert_rate_limit_headers(response.headers_mut(), &decision);
                    Ok(response)
                }
                DecisionBasis::Bucket => {
                    warn!(
                        tenant_id = %tenant.tenant_id(),
                        tier = %tenant.limits.tier,
                        retry_after = decision.retry_after_seconds,
                        "rate limit exceeded"
                    );
                    Ok(rate_limited_response(&decision))
                }
                DecisionBasis::FailOpen => {
                    req.extensions_mut().insert(AuthenticatedTenant(tenant));
                    inner.call(req).await
                }
                DecisionBasis::FailClosed => Ok(unavailable_response(decision.retry_after_seconds)),
            }
        })
    }
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(RATE_LIMIT_LIMIT_HEADER, decision.limit.into());
    headers.insert(RATE_LIMIT_REMAINING_HEADER, decision.remaining.into());
    headers.insert(RATE_LIMIT_RESET_HEADER, decision.reset_time_ms.into());
}

/// 429 with the standard rate-limit headers and a `Retry-After`.
fn rate_limited_response(decision: &Decision) -> Response {
    let body = serde_json::json!({
        "error": "Too Many Requests",
        "message": "Rate limit exceeded. Please try again later.",
        "limit": decision.limit,
        "remaining": decision.remaining,
        "retry_after": decision.retry_after_seconds,
        "reset_time": decision.reset_time_ms,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    let headers = response.headers_mut();
    insert_rate_limit_headers(headers, decision);
    headers.insert(header::RETRY_AFTER, decision.retry_after_seconds.into());
    response
}

/// 503 returned when the store is down and the limiter is set to fail closed.
fn unavailable_response(retry_after_seconds: u64) -> Response {
    let mut response = error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "Rate limiting is temporarily unavailable. Please try again later.",
    );
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, retry_after_seconds.into());
    response
}
