//! Thin client for the external machine-translation provider.
//!
//! The provider itself is an opaque collaborator per the system's scope: this
//! module's job is only to shape the HTTP call, classify the response into
//! the closed error taxonomy, and (in tests / `MOCK_PROVIDER=true`) stand in
//! for it without a real network call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    mock: bool,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    texts: &'a [String],
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<String>,
}

impl ProviderClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        mock: bool,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("provider HTTP client builds with valid defaults");
        Self { http, base_url, api_key, mock }
    }

    /// Translate a batch of texts into `target_lang`. The returned vector has
    /// exactly `texts.len()` entries in the same order, or an error is
    /// returned — callers must not accept a mismatched count.
    pub async fn translate(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>> {
        if self.mock {
            return Ok(texts.iter().map(|t| format!("{t} [{}]", target_lang.to_uppercase())).collect());
        }

        let mut req = self
            .http
            .post(format!("{}/translate", self.base_url))
            .json(&TranslateRequest { texts, source_lang, target_lang });

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(classify_transport_error)?;
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ProviderRetryable(match retry_after {
                Some(secs) => format!("429 rate limited, retry-after={secs}s: {body}"),
                None => format!("429 rate limited: {body}"),
            }));
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ProviderRetryable(format!("{status}: {body}")));
        }
        if status.as_u16() == 400 || status.as_u16() == 403 || status.as_u16() == 456 {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ProviderFatal(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ProviderFatal(format!("{status}: {body}")));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ProviderFatal(format!("malformed provider response: {e}")))?;

        if parsed.translations.len() != texts.len() {
            return Err(PipelineError::ProviderFatal(format!(
                "provider returned {} translations for {} requested texts",
                parsed.translations.len(),
                texts.len()
            )));
        }

        Ok(parsed.translations)
    }
}

fn classify_transport_error(err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::ProviderRetryable(format!("provider request timed out: {err}"))
    } else {
        PipelineError::ProviderRetryable(format!("provider transport error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_tags_each_text_with_locale() {
        let client = ProviderClient::new("unused".into(), None, Duration::from_secs(1), true);
        let texts = vec!["Hello".to_string(), "World".to_string()];
        let out = client.translate(&texts, "auto", "fr").await.unwrap();
        assert_eq!(out, vec!["Hello [FR]".to_string(), "World [FR]".to_string()]);
    }

    #[tokio::test]
    async fn mock_provider_preserves_order_and_count() {
        let client = ProviderClient::new("unused".into(), None, Duration::from_secs(1), true);
        let texts: Vec<String> = (0..10).map(|i| format!("text-{i}")).collect();
        let out = client.translate(&texts, "auto", "es").await.unwrap();
        assert_eq!(out.len(), texts.len());
        for (i, o) in out.iter().enumerate() {
            assert!(o.starts_with(&format!("text-{i}")));
        }
    }

    #[tokio::test]
    async fn real_success_response_is_parsed() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "translations": ["bonjour"]
            })))
            .mount(&server)
            .await;

        let client = ProviderClient::new(server.uri(), Some("k".into()), Duration::from_secs(2), false);
        let out = client.translate(&["hello".to_string()], "auto", "fr").await.unwrap();
        assert_eq!(out, vec!["bonjour".to_string()]);
    }

    #[tokio::test]
    async fn rate_limit_response_is_retryable() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let client = ProviderClient::new(server.uri(), Some("k".into()), Duration::from_secs(2), false);
        let err = client.translate(&["hello".to_string()], "auto", "fr").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn quota_exceeded_response_is_fatal() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(456))
            .mount(&server)
            .await;

        let client = ProviderClient::new(server.uri(), Some("k".into()), Duration::from_secs(2), false);
        let err = client.translate(&["hello".to_string()], "auto", "fr").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn mismatched_translation_count_is_fatal() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "translations": ["only-one"]
            })))
            .mount(&server)
            .await;

        let client = ProviderClient::new(server.uri(), Some("k".into()), Duration::from_secs(2), false);
        let err = client
            .translate(&["a".to_string(), "b".to_string()], "auto", "fr")
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
