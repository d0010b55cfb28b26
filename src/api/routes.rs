//! Route table assembly: binds every handler in `handlers`/`webhooks` to its
//! path and wires the per-route auth layer plus the shared middleware stack.

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

use super::handlers::{health_handler, status_handler, translate_handler, worker_run_handler};
use super::middleware::{
    bearer_auth_middleware, cors_layer, request_id_middleware, request_logging_middleware,
    security_headers_middleware, worker_secret_middleware,
};
use super::webhooks::lemonsqueezy_webhook_handler;
use super::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let config = state.config.clone();

    let intake_and_status = Router::new()
        .route("/translate", post(translate_handler))
        .route("/translate/:job_id", get(status_handler))
        .layer(from_fn_with_state(config.clone(), bearer_auth_middleware));

    let worker_trigger = Router::new()
        .route("/worker/run", post(worker_run_handler))
        .layer(from_fn_with_state(config.clone(), worker_secret_middleware));

    let webhook = Router::new().route("/webhooks/lemonsqueezy", post(lemonsqueezy_webhook_handler));

    let health = Router::new().route("/health", get(health_handler));

    let body_limit = state.config.max_html_bytes.saturating_mul(2).max(1024 * 1024);

    Router::new()
        .merge(intake_and_status)
        .merge(worker_trigger)
        .merge(webhook)
        .merge(health)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_id_middleware))
                .layer(from_fn(security_headers_middleware))
                .layer(from_fn(request_logging_middleware))
                .layer(cors_layer())
                .layer(RequestBodyLimitLayer::new(body_limit)),
        )
        .with_state(state)
}
