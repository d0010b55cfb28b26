//! HTTP API Surface (C9): the axum transport binding for intake (C6),
//! status (C8), the worker trigger (C7), the billing webhook, and a health
//! endpoint backed by the connection pool (C11).
//!
//! Every success response is wrapped in [`responses::ApiResponse`]; every
//! error is an RFC 7807 [`responses::ApiError`] converted from a
//! [`crate::error::PipelineError`] at the handler boundary. Auth is flat
//! per §6: bearer compare for intake/status, a shared-secret header for the
//! worker trigger, HMAC-SHA256 for the webhook — there is no session,
//! token, or role model to carry over from the teacher's SaaS auth stack.

pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;
pub mod webhooks;

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::db::pool::Pool;
use crate::fetch::Fetcher;
use crate::intake::Intake;
use crate::provider::ProviderClient;
use crate::ratelimit::RateLimiter;
use crate::worker::WorkerConfig;

/// Shared application state handed to every route. Cloning is cheap — every
/// field is an `Arc` or already `Clone` (the pool wraps `sqlx::PgPool`).
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<AppConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub intake: Arc<Intake>,
    pub provider: Arc<ProviderClient>,
    pub worker_config: WorkerConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(pool: Pool, config: Arc<AppConfig>) -> Self {
        let fetcher = Fetcher::new(config.fetch_timeout, config.max_html_bytes);
        let provider = Arc::new(ProviderClient::new(
            config.provider_base_url.clone(),
            config.provider_api_key.clone(),
            config.provider_timeout,
            config.mock_provider,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(config.max_pages_per_minute));
        let intake = Arc::new(Intake::new(pool.clone(), fetcher, config.clone()));
        let worker_config = WorkerConfig::from_app_config(&config, WorkerConfig::default_worker_id());

        Self {
            pool,
            config,
            rate_limiter,
            intake,
            provider,
            worker_config,
            started_at: Instant::now(),
        }
    }
}
