//! Bounded retrieval of `html` for intake's `url` path.
//!
//! The SSRF guard itself (rejecting private/loopback/metadata destinations)
//! is an upstream collaborator per scope; this module only enforces the
//! per-request deadline and the response-body size cap, and classifies
//! transport failures into the pipeline's error taxonomy.

use std::time::Duration;

use futures::StreamExt;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct Fetcher {
    http: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl Fetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("fetch HTTP client builds with valid defaults");
        Self { http, timeout, max_bytes }
    }

    /// Fetch `url`, aborting as soon as the streamed body exceeds
    /// `max_bytes` rather than buffering an unbounded response first.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let response = tokio::time::timeout(self.timeout, self.http.get(url).send())
            .await
            .map_err(|_| PipelineError::FetchTimeout)?
            .map_err(classify_fetch_error)?;

        if !response.status().is_success() {
            return Err(PipelineError::FetchFailed(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(PipelineError::PayloadTooLarge);
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = tokio::time::timeout(self.timeout, stream.next())
            .await
            .map_err(|_| PipelineError::FetchTimeout)?
        {
            let chunk = chunk.map_err(classify_fetch_error)?;
            if body.len() + chunk.len() > self.max_bytes {
                return Err(PipelineError::PayloadTooLarge);
            }
            body.extend_from_slice(&chunk);
        }

        String::from_utf8(body)
            .map_err(|e| PipelineError::FetchFailed(format!("non-UTF-8 response body: {e}")))
    }
}

fn classify_fetch_error(err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::FetchTimeout
    } else {
        PipelineError::FetchFailed(err.to_string())
    }
}
