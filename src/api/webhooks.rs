//! Billing webhook receiver. Out of core scope per §1 (treated as an
//! external collaborator) beyond the one property this system actually
//! enforces: HMAC verification *before* JSON parsing, and dedup by the
//! provider's event id so a replayed delivery never applies twice.
//!
//! No affiliate-conversion side effect is implemented here — see the open
//! question recorded in `DESIGN.md`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::HeaderMap,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;

use super::middleware::constant_time_eq;
use super::responses::{ApiError, ApiResponse, RequestId};
use super::AppState;
use crate::db::webhook_events;
use crate::error::PipelineError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}

/// `POST /webhooks/lemonsqueezy`.
pub async fn lemonsqueezy_webhook_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<WebhookAck>, ApiError> {
    let start = std::time::Instant::now();

    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(PipelineError::Unauthorized)?;

    if !verify_signature(&state.config.lemonsqueezy_webhook_secret, &body, signature) {
        return Err(PipelineError::Unauthorized.into());
    }

    let event_name = headers
        .get("x-event-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| PipelineError::Validation(format!("invalid webhook JSON: {e}")))?;

    let event_id = payload
        .get("meta")
        .and_then(|m| m.get("event_id"))
        .and_then(|v| v.as_str())
        .or_else(|| payload.get("id").and_then(|v| v.as_str()))
        .ok_or_else(|| PipelineError::Validation("webhook payload missing an event id".into()))?
        .to_string();

    let is_new = webhook_events::record_if_new(&state.pool, &event_id, &event_name, &payload).await?;

    if is_new {
        tracing::info!(event_id = %event_id, event_name = %event_name, "billing webhook applied");
    } else {
        tracing::info!(event_id = %event_id, event_name = %event_name, "billing webhook replay ignored");
    }

    Ok(ApiResponse::new(
        WebhookAck { received: true, duplicate: !is_new },
        request_id.0,
        start.elapsed().as_millis() as u64,
    ))
}

/// HMAC-SHA256 over the raw body, compared in constant time against
/// `x-signature`. The provider's header may or may not carry a `sha256=`
/// prefix; both forms are accepted.
fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    let provided = signature.strip_prefix("sha256=").unwrap_or(signature);
    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn verifies_matching_signature() {
        let body = br#"{"id":"evt_1"}"#;
        let sig = sign("shh", body);
        assert!(verify_signature("shh", body, &sig));
    }

    #[test]
    fn verifies_matching_signature_with_sha256_prefix() {
        let body = br#"{"id":"evt_1"}"#;
        let sig = format!("sha256={}", sign("shh", body));
        assert!(verify_signature("shh", body, &sig));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = br#"{"id":"evt_1"}"#;
        let sig = sign("shh", body);
        assert!(!verify_signature("different", body, &sig));
    }

    #[test]
    fn rejects_tampered_body() {
        let body = br#"{"id":"evt_1"}"#;
        let sig = sign("shh", body);
        assert!(!verify_signature("shh", br#"{"id":"evt_2"}"#, &sig));
    }
}
