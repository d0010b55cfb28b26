//! Fail-fast environment configuration. Built once at startup and shared via
//! `Arc` with every component that needs a slice of it.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,

    pub translate_api_key: String,
    pub worker_run_secret: String,
    pub lemonsqueezy_webhook_secret: String,

    pub database_url: String,
    pub db_service_key: String,
    pub db_min_connections: u32,
    pub db_max_connections: u32,
    pub db_connect_timeout: Duration,
    pub db_health_check_interval: Duration,
    pub migrate_on_startup: bool,

    pub provider_api_key: Option<String>,
    pub provider_base_url: String,
    pub provider_timeout: Duration,
    pub provider_max_retries: u32,
    pub mock_provider: bool,

    pub fetch_timeout: Duration,
    pub max_html_bytes: usize,

    pub max_pages_per_minute: u32,
    pub max_segments: usize,
    pub max_segment_target_pairs: usize,

    pub worker_lease_seconds: i64,
    pub worker_max_job_attempts: i32,
    pub worker_idle_poll: Duration,
    pub worker_concurrency: usize,
    pub worker_heartbeat: Duration,

    pub token_enc_key: Option<[u8; 32]>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mock_provider = bool_var("MOCK_PROVIDER", false)?;
        let provider_api_key = optional_var("PROVIDER_API_KEY");
        if !mock_provider && provider_api_key.is_none() {
            return Err(ConfigError::Missing("PROVIDER_API_KEY"));
        }

        let token_enc_key = match optional_var("TOKEN_ENC_KEY") {
            None => None,
            Some(raw) => {
                use base64::Engine;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(&raw)
                    .map_err(|_| ConfigError::Invalid { name: "TOKEN_ENC_KEY", value: raw.clone() })?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| ConfigError::Invalid { name: "TOKEN_ENC_KEY", value: raw })?;
                Some(arr)
            }
        };

        Ok(Self {
            bind_addr: string_var("HTTP_BIND_ADDR", "0.0.0.0:8080"),

            translate_api_key: required_var("TRANSLATE_API_KEY")?,
            worker_run_secret: required_var("WORKER_RUN_SECRET")?,
            lemonsqueezy_webhook_secret: required_var("LEMONSQUEEZY_WEBHOOK_SECRET")?,

            database_url: required_var("DB_URL")?,
            db_service_key: required_var("DB_SERVICE_KEY")?,
            db_min_connections: int_var("DB_MIN_CONNECTIONS", 2)?,
            db_max_connections: int_var("DB_MAX_CONNECTIONS", 10)?,
            db_connect_timeout: millis_var("DB_CONNECT_TIMEOUT_MS", 5000)?,
            db_health_check_interval: millis_var("DB_HEALTH_CHECK_INTERVAL_MS", 30000)?,
            migrate_on_startup: bool_var("MIGRATE_ON_STARTUP", true)?,

            provider_api_key,
            provider_base_url: string_var("PROVIDER_BASE_URL", "https://api.provider.example/v1"),
            provider_timeout: millis_var("PROVIDER_TIMEOUT_MS", 10000)?,
            provider_max_retries: int_var("PROVIDER_MAX_RETRIES", 3)?,
            mock_provider,

            fetch_timeout: millis_var("FETCH_TIMEOUT_MS", 5000)?,
            max_html_bytes: int_var::<usize>("MAX_HTML_BYTES", 2 * 1024 * 1024)?,

            max_pages_per_minute: int_var("TRANSLATE_MAX_PAGES_PER_MINUTE", 10)?,
            max_segments: int_var("TRANSLATE_MAX_SEGMENTS", 5000)?,
            max_segment_target_pairs: int_var("TRANSLATE_MAX_SEGMENT_TARGET_PAIRS", 20000)?,

            worker_lease_seconds: int_var("WORKER_LEASE_SECONDS", 300)?,
            worker_max_job_attempts: int_var("WORKER_MAX_JOB_ATTEMPTS", 5)?,
            worker_idle_poll: millis_var("WORKER_IDLE_POLL_MS", 2000)?,
            worker_concurrency: int_var::<usize>("WORKER_CONCURRENCY", 1)?,
            worker_heartbeat: millis_var("WORKER_HEARTBEAT_MS", 60000)?,

            token_enc_key,
        })
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional_var(name: &'static str) -> Option<String> {
    std::env::var(name).ok()
}

fn string_var(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn bool_var(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(v) => v
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}

fn int_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(v) => v
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}

fn millis_var(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    int_var::<u64>(name, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn set_required(extra: &[(&str, &str)]) {
        std::env::set_var("TRANSLATE_API_KEY", "k1");
        std::env::set_var("WORKER_RUN_SECRET", "k2");
        std::env::set_var("LEMONSQUEEZY_WEBHOOK_SECRET", "k3");
        std::env::set_var("DB_URL", "postgres://localhost/test");
        std::env::set_var("DB_SERVICE_KEY", "svc-key");
        std::env::set_var("MOCK_PROVIDER", "true");
        for (k, v) in extra {
            std::env::set_var(k, v);
        }
    }

    #[test]
    fn loads_with_defaults_when_optional_vars_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required(&[]);
        let cfg = AppConfig::from_env().expect("config should load");
        assert_eq!(cfg.worker_lease_seconds, 300);
        assert_eq!(cfg.max_pages_per_minute, 10);
    }

    #[test]
    fn missing_provider_key_without_mock_fails() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required(&[("MOCK_PROVIDER", "false")]);
        std::env::remove_var("PROVIDER_API_KEY");
        let result = AppConfig::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn invalid_int_value_fails_fast() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required(&[("WORKER_CONCURRENCY", "not-a-number")]);
        let result = AppConfig::from_env();
        assert!(result.is_err());
    }
}
