//! Cross-cutting HTTP middleware: request-id assignment, structured request
//! logging, security headers, CORS, and the three flat-credential auth
//! checks this system needs (bearer for intake/status, shared-secret header
//! for the worker trigger). None of these carry session/role state — that
//! whole layer (JWT, RBAC, per-request user context) belonged to the
//! teacher's SaaS surface, not this pipeline's flat-credential model.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use super::responses::{ApiError, RequestId};
use crate::config::AppConfig;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Assign (or propagate) a request id into extensions and the response
/// header, matching the teacher's `request_id_middleware` shape.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }
    response
}

/// Structured request/response logging via `tracing`, fields matching the
/// teacher's `request_logging_middleware`.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info!(request_id = %request_id, method = %method, uri = %uri, "incoming request");

    let response = next.run(request).await;

    let duration = start.elapsed();
    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = duration.as_millis() as u64,
        "request completed"
    );

    response
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert("Content-Security-Policy", HeaderValue::from_static("default-src 'self'"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("strict-origin-when-cross-origin"));
    response
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, HeaderValue::from_static("x-worker-secret"), HeaderValue::from_static("x-signature"), HeaderValue::from_static("x-event-name")])
        .expose_headers([HeaderValue::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600))
}

/// Bearer-token check for `/translate` and `/translate/:job_id`: constant-time
/// compare against `TRANSLATE_API_KEY`, per §6.
pub async fn bearer_auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(ApiError::from(crate::error::PipelineError::Unauthorized))?;

    if !constant_time_eq(token.as_bytes(), config.translate_api_key.as_bytes()) {
        return Err(ApiError::from(crate::error::PipelineError::Unauthorized));
    }

    Ok(next.run(request).await)
}

/// Shared-secret header check for `/worker/run`: constant-time compare of
/// `X-Worker-Secret` against `WORKER_RUN_SECRET`.
pub async fn worker_secret_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get("x-worker-secret")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::from(crate::error::PipelineError::Unauthorized))?;

    if !constant_time_eq(provided.as_bytes(), config.worker_run_secret.as_bytes()) {
        return Err(ApiError::from(crate::error::PipelineError::Unauthorized));
    }

    Ok(next.run(request).await)
}

/// Constant-time byte comparison, shared by every credential check in this
/// module and by the webhook's HMAC verification.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq(b"secret", b"secret"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatch() {
        assert!(!constant_time_eq(b"secret", b"wrong!!"));
        assert!(!constant_time_eq(b"short", b"longer-value"));
    }
}
