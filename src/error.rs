//! Closed error taxonomy for the translation pipeline.
//!
//! Every failure that can reach a client or a worker decision point is one of
//! these variants. Library/transport errors (`sqlx`, `reqwest`) are converted
//! at the earliest call site; handlers and worker code never match on them
//! directly.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("fetch timed out")]
    FetchTimeout,

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider error (retryable): {0}")]
    ProviderRetryable(String),

    #[error("provider error (fatal): {0}")]
    ProviderFatal(String),

    #[error("job not found")]
    NotFound,

    #[error("transient database error: {0}")]
    DbTransient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                PipelineError::DbTransient(err.to_string())
            }
            sqlx::Error::Database(db_err) => {
                // 40001 serialization_failure, 40P01 deadlock_detected: retry.
                match db_err.code().as_deref() {
                    Some("40001") | Some("40P01") => PipelineError::DbTransient(err.to_string()),
                    _ => PipelineError::Internal(err.to_string()),
                }
            }
            _ => PipelineError::Internal(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::FetchTimeout
        } else if err.is_connect() {
            PipelineError::FetchFailed(err.to_string())
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 || status.is_server_error() {
                PipelineError::ProviderRetryable(err.to_string())
            } else {
                PipelineError::ProviderFatal(err.to_string())
            }
        } else {
            PipelineError::FetchFailed(err.to_string())
        }
    }
}

impl PipelineError {
    /// Whether the worker should retry (Release) rather than fail permanently (Complete(false)).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ProviderRetryable(_)
                | PipelineError::DbTransient(_)
                | PipelineError::FetchTimeout
                | PipelineError::FetchFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(PipelineError::ProviderRetryable("x".into()).is_retryable());
        assert!(PipelineError::DbTransient("x".into()).is_retryable());
        assert!(!PipelineError::ProviderFatal("x".into()).is_retryable());
        assert!(!PipelineError::Validation("x".into()).is_retryable());
    }
}
