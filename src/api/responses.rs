//! Standardized response envelope for the translation pipeline's HTTP
//! surface.
//!
//! Success responses carry the JSON shape the external interface describes
//! (`{jobId, cachedCount, toTranslateCount}`, `{status, ...}`, etc.) wrapped
//! in a thin `data`/`meta`/`success`/`timestamp` envelope so every endpoint
//! answers the same shape regardless of payload. Errors follow RFC 7807
//! (`application/problem+json`): a stable `type`/`title`/`status`/`detail`
//! quadruple per §7's closed error taxonomy, never a raw library message.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::PipelineError;

/// Request id assigned by `request_id_middleware` and threaded through
/// extensions to handlers and the response envelope alike.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub meta: ResponseMeta,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, request_id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            data,
            meta: ResponseMeta { request_id: request_id.into(), duration_ms },
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: &'static str,
    pub status: u16,
    pub detail: String,
}

impl ApiError {
    pub fn new(kind: &'static str, title: &'static str, status: StatusCode, detail: impl Into<String>) -> Self {
        Self { kind, title, status: status.as_u16(), detail: detail.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Maps a `PipelineError` to its §7 category: stable `type`/`title`/`status`,
/// detail text scrubbed of anything the error taxonomy doesn't intend to
/// expose (provider/db internals stay out of `ProviderFatal`/`DbTransient`
/// responses; only validation-shaped errors echo their own message).
impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match &err {
            PipelineError::Validation(msg) => ApiError::new(
                "validation",
                "Request failed validation",
                StatusCode::BAD_REQUEST,
                msg.clone(),
            ),
            PipelineError::Unauthorized => ApiError::new(
                "unauthorized",
                "Missing or invalid credentials",
                StatusCode::UNAUTHORIZED,
                "authentication failed",
            ),
            PipelineError::PayloadTooLarge => ApiError::new(
                "payload_too_large",
                "HTML payload exceeds the configured cap",
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload too large",
            ),
            PipelineError::FetchTimeout => ApiError::new(
                "fetch_timeout",
                "Fetching the source URL timed out",
                StatusCode::GATEWAY_TIMEOUT,
                "fetch timed out",
            ),
            PipelineError::FetchFailed(_) => ApiError::new(
                "fetch_failed",
                "Fetching the source URL failed",
                StatusCode::BAD_GATEWAY,
                "fetch failed",
            ),
            PipelineError::RateLimited { retry_after_secs } => ApiError::new(
                "rate_limited",
                "Too many requests for this site",
                StatusCode::TOO_MANY_REQUESTS,
                format!("retry after {retry_after_secs}s"),
            ),
            PipelineError::NotFound => ApiError::new(
                "not_found",
                "Job not found",
                StatusCode::NOT_FOUND,
                "no job with that id is owned by this site",
            ),
            PipelineError::ProviderRetryable(_) | PipelineError::ProviderFatal(_) => ApiError::new(
                "internal",
                "Translation provider error",
                StatusCode::INTERNAL_SERVER_ERROR,
                "translation provider error",
            ),
            PipelineError::DbTransient(_) => ApiError::new(
                "internal",
                "Temporary database error",
                StatusCode::SERVICE_UNAVAILABLE,
                "temporary database error, please retry",
            ),
            PipelineError::Internal(_) => ApiError::new(
                "internal",
                "Internal error",
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_400() {
        let api_err: ApiError = PipelineError::Validation("bad input".into()).into();
        assert_eq!(api_err.status, 400);
        assert_eq!(api_err.kind, "validation");
    }

    #[test]
    fn provider_fatal_never_leaks_raw_message() {
        let api_err: ApiError = PipelineError::ProviderFatal("sk-secret-leak".into()).into();
        assert!(!api_err.detail.contains("sk-secret-leak"));
    }

    #[test]
    fn not_found_maps_to_404() {
        let api_err: ApiError = PipelineError::NotFound.into();
        assert_eq!(api_err.status, 404);
    }
}
