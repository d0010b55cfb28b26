//! Request handlers binding C6 (intake), C8 (status), C7 (the worker
//! trigger), and C11 (health) to HTTP.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use super::responses::{ApiError, ApiResponse, RequestId};
use super::AppState;
use crate::error::PipelineError;
use crate::intake::HtmlSource;
use crate::ratelimit::Decision;
use crate::status;
use crate::worker::WorkerLoop;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub site_id: Uuid,
    pub url: Option<String>,
    pub html: Option<String>,
    #[serde(default)]
    pub target_locales: Vec<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// `POST /translate` — C6.
pub async fn translate_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<TranslateRequest>,
) -> Result<ApiResponse<crate::intake::IntakeResult>, ApiError> {
    let start = Instant::now();

    match state.rate_limiter.check(body.site_id) {
        Decision::Allowed => {}
        Decision::Denied { retry_after } => {
            return Err(PipelineError::RateLimited { retry_after_secs: retry_after.as_secs().max(1) }.into());
        }
    }

    let source = match (&body.url, &body.html) {
        (Some(url), None) => HtmlSource::Url(url),
        (None, Some(html)) => HtmlSource::Inline(html),
        (Some(_), Some(_)) => {
            return Err(PipelineError::Validation("exactly one of url or html must be set".into()).into())
        }
        (None, None) => {
            return Err(PipelineError::Validation("one of url or html is required".into()).into())
        }
    };

    let result = state
        .intake
        .admit(body.site_id, source, &body.target_locales, body.idempotency_key.as_deref())
        .await?;

    Ok(ApiResponse::new(result, request_id.0, start.elapsed().as_millis() as u64))
}

/// `GET /translate/:job_id` — C8. Tenant ownership requires `site_id` as a
/// query parameter, since this flat-credential API has no session to derive
/// it from the way a logged-in user request would.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub site_id: Uuid,
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<ApiResponse<status::StatusReport>, ApiError> {
    let start = Instant::now();
    let report = status::read_status(&state.pool, query.site_id, job_id).await?;
    Ok(ApiResponse::new(report, request_id.0, start.elapsed().as_millis() as u64))
}

#[derive(Debug, Deserialize)]
pub struct WorkerRunQuery {
    #[serde(default = "default_batch")]
    pub batch: usize,
}

fn default_batch() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct WorkerRunResponse {
    pub outcomes: Vec<crate::worker::JobOutcome>,
}

/// `POST /worker/run` — drives C7 synchronously for up to `batch` claims and
/// reports a per-job outcome, for deployments that trigger the worker
/// externally (e.g. a scheduled function) rather than running it as a
/// standing process.
pub async fn worker_run_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<WorkerRunQuery>,
) -> Result<ApiResponse<WorkerRunResponse>, ApiError> {
    let start = Instant::now();
    let (_tx, rx) = watch::channel(false);
    let worker = WorkerLoop::new(state.pool.clone(), state.provider.clone(), state.worker_config.clone());
    let outcomes = worker.run(rx, true, Some(query.batch)).await;
    Ok(ApiResponse::new(
        WorkerRunResponse { outcomes },
        request_id.0,
        start.elapsed().as_millis() as u64,
    ))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub is_healthy: bool,
    pub latency_ms: u64,
    pub idle_connections: u32,
    pub uptime_secs: u64,
}

/// `GET /health` — no auth, consulted by operators per §6, not by the
/// pipeline itself.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let check = state.pool.health_check().await;
    Json(HealthResponse {
        is_healthy: check.is_healthy,
        latency_ms: check.latency_ms,
        idle_connections: check.idle_connections,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_request_deserializes_camel_case() {
        let json = r#"{"siteId":"11111111-1111-1111-1111-111111111111","html":"<p>hi there</p>","targetLocales":["fr"]}"#;
        let req: TranslateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.target_locales, vec!["fr".to_string()]);
        assert!(req.html.is_some());
        assert!(req.url.is_none());
    }
}
