//! Worker Loop (C7): claim a job, translate its pending work units in
//! per-target-language batches with retry-with-backoff, persist results, and
//! complete or release. Modeled on the claim/attempt/outcome shape of a
//! batch job runner, adapted from a batch-lease-per-tick design to a
//! single-claim-per-slot design since this queue has one row per job rather
//! than per-task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::jobs::WorkUnit;
use crate::db::pool::Pool;
use crate::db::{jobs, memory, queue};
use crate::error::{PipelineError, Result};
use crate::provider::ProviderClient;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub lease_seconds: i64,
    pub max_attempts: i32,
    pub idle_poll: Duration,
    pub concurrency: usize,
    pub heartbeat: Duration,
    pub retries: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub backoff_jitter: f64,
    pub chunk_size: usize,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig, worker_id: String) -> Self {
        Self {
            worker_id,
            lease_seconds: config.worker_lease_seconds,
            max_attempts: config.worker_max_job_attempts,
            idle_poll: config.worker_idle_poll,
            concurrency: config.worker_concurrency.max(1),
            heartbeat: config.worker_heartbeat,
            retries: config.provider_max_retries,
            backoff_min: Duration::from_millis(500),
            backoff_max: Duration::from_millis(5000),
            backoff_jitter: 0.2,
            chunk_size: 50,
        }
    }

    pub fn default_worker_id() -> String {
        let hostname = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "worker".to_string());
        let pid = std::process::id();
        let suffix: u32 = rand::thread_rng().gen();
        format!("{hostname}-{pid}-{suffix:08x}")
    }
}

/// Runs the claim/process loop until `shutdown` fires, then drains in-flight
/// jobs and releases any leases they still hold.
pub struct WorkerLoop {
    pool: Pool,
    provider: Arc<ProviderClient>,
    config: WorkerConfig,
}

/// One claim's worth of held state, kept so shutdown can release it if the
/// processing task is still in flight.
struct HeldLease {
    job_id: Uuid,
    lock_token: Uuid,
}

impl WorkerLoop {
    pub fn new(pool: Pool, provider: Arc<ProviderClient>, config: WorkerConfig) -> Self {
        Self { pool, provider, config }
    }

    /// Drive the loop until `shutdown` is signalled. If `run_once` is set,
    /// returns after the first idle poll finds nothing claimable instead of
    /// sleeping and retrying forever — used by the `/worker/run` HTTP trigger
    /// to drain up to `batch` jobs per invocation.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>, run_once: bool, batch: Option<usize>) -> Vec<JobOutcome> {
        let mut in_flight: JoinSet<JobOutcome> = JoinSet::new();
        let mut held: HashMap<tokio::task::Id, HeldLease> = HashMap::new();
        let mut outcomes = Vec::new();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat);
        let mut claimed_total = 0usize;

        loop {
            if let Some(limit) = batch {
                if claimed_total >= limit && in_flight.is_empty() {
                    break;
                }
            }

            while in_flight.len() >= self.config.concurrency {
                tokio::select! {
                    Some(joined) = in_flight.join_next_with_id() => {
                        self.absorb_result(joined, &mut held, &mut outcomes);
                    }
                    _ = shutdown.changed() => {
                        self.drain_and_release(in_flight, held).await;
                        return outcomes;
                    }
                }
            }

            if *shutdown.borrow() {
                self.drain_and_release(in_flight, held).await;
                return outcomes;
            }

            let claim = match queue::claim(&self.pool, &self.config.worker_id, self.config.lease_seconds).await {
                Ok(claim) => claim,
                Err(err) => {
                    tracing::warn!(error = %err, "claim failed, backing off");
                    tokio::time::sleep(self.config.idle_poll).await;
                    continue;
                }
            };

            let Some(claimed) = claim else {
                if run_once && in_flight.is_empty() {
                    return outcomes;
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.config.idle_poll) => {}
                    Some(joined) = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                        self.absorb_result(joined, &mut held, &mut outcomes);
                    }
                    _ = heartbeat.tick() => {
                        tracing::info!(worker_id = %self.config.worker_id, in_flight = in_flight.len(), "heartbeat");
                    }
                    _ = shutdown.changed() => {
                        self.drain_and_release(in_flight, held).await;
                        return outcomes;
                    }
                }
                continue;
            };

            claimed_total += 1;
            let pool = self.pool.clone();
            let provider = self.provider.clone();
            let config = self.config.clone();
            let job_id = claimed.job_id;
            let lock_token = claimed.lock_token;
            let attempts = claimed.attempts;

            let handle = in_flight.spawn(async move {
                process_claimed_job(&pool, &provider, &config, job_id, lock_token, attempts).await
            });
            held.insert(handle.id(), HeldLease { job_id, lock_token });
        }
    }

    fn absorb_result(
        &self,
        joined: Result<(tokio::task::Id, JobOutcome), tokio::task::JoinError>,
        held: &mut HashMap<tokio::task::Id, HeldLease>,
        outcomes: &mut Vec<JobOutcome>,
    ) {
        match joined {
            Ok((id, outcome)) => {
                held.remove(&id);
                outcomes.push(outcome);
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "job processing task panicked");
            }
        }
    }

    async fn drain_and_release(&self, mut in_flight: JoinSet<JobOutcome>, held: HashMap<tokio::task::Id, HeldLease>) {
        while let Some(joined) = in_flight.join_next_with_id().await {
            if let Ok((id, _)) = joined {
                if let Some(lease) = held.get(&id) {
                    let _ = queue::release(&self.pool, lease.job_id, lease.lock_token, Some("worker shutdown")).await;
                }
            }
        }
        for lease in held.into_values() {
            let _ = queue::release(&self.pool, lease.job_id, lease.lock_token, Some("worker shutdown")).await;
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub status: JobOutcomeStatus,
    pub segments_processed: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcomeStatus {
    Ok,
    Error,
}

async fn process_claimed_job(
    pool: &Pool,
    provider: &ProviderClient,
    config: &WorkerConfig,
    job_id: Uuid,
    lock_token: Uuid,
    attempts: i32,
) -> JobOutcome {
    if attempts > config.max_attempts {
        let _ = queue::complete(pool, job_id, lock_token, false, Some("exceeded maximum attempts")).await;
        return JobOutcome {
            job_id,
            status: JobOutcomeStatus::Error,
            segments_processed: 0,
            cache_hits: 0,
            cache_misses: 0,
        };
    }

    match run_job(pool, provider, config, job_id).await {
        Ok(processed) => {
            match queue::complete(pool, job_id, lock_token, true, None).await {
                Ok(true) => JobOutcome {
                    job_id,
                    status: JobOutcomeStatus::Ok,
                    segments_processed: processed,
                    cache_hits: 0,
                    cache_misses: processed,
                },
                _ => {
                    // Lock token no longer matches: lease expired and another
                    // worker already took this job. Log and discard.
                    tracing::warn!(job_id = %job_id, "complete(true) matched no row, lease was reclaimed");
                    JobOutcome { job_id, status: JobOutcomeStatus::Error, segments_processed: processed, cache_hits: 0, cache_misses: 0 }
                }
            }
        }
        Err(err) => {
            let message = err.to_string();
            if err.is_retryable() && attempts < config.max_attempts {
                let _ = queue::release(pool, job_id, lock_token, Some(&message)).await;
            } else {
                let _ = queue::complete(pool, job_id, lock_token, false, Some(&message)).await;
            }
            JobOutcome { job_id, status: JobOutcomeStatus::Error, segments_processed: 0, cache_hits: 0, cache_misses: 0 }
        }
    }
}

/// Load pending work units, group by target language, translate each group
/// in provider-sized chunks with retry, and persist results per group so
/// partial progress survives a later group's failure.
async fn run_job(pool: &Pool, provider: &ProviderClient, config: &WorkerConfig, job_id: Uuid) -> Result<usize> {
    let units = jobs::read_units(pool, job_id).await?;
    let pending: Vec<WorkUnit> = units.into_iter().filter(|u| u.translated_text.is_none()).collect();

    let mut by_target: HashMap<String, Vec<WorkUnit>> = HashMap::new();
    for unit in pending {
        by_target.entry(unit.target_lang.clone()).or_default().push(unit);
    }

    let site_id = site_id_for_job(pool, job_id).await?;
    let mut total_processed = 0usize;

    for (target_lang, group) in by_target {
        let mut results: Vec<(Uuid, String)> = Vec::with_capacity(group.len());
        let mut memory_entries = Vec::with_capacity(group.len());

        for chunk in group.chunks(config.chunk_size) {
            let texts: Vec<String> = chunk.iter().map(|u| u.source_text.clone()).collect();
            let source_lang = chunk[0].source_lang.clone();
            let translations = translate_with_retry(provider, config, &texts, &source_lang, &target_lang).await?;

            for (unit, translated) in chunk.iter().zip(translations.into_iter()) {
                results.push((unit.id, translated.clone()));
                memory_entries.push(crate::db::memory::MemoryEntry {
                    segment_hash: unit.segment_hash.clone(),
                    source_lang: unit.source_lang.clone(),
                    target_lang: target_lang.clone(),
                    text: translated,
                });
            }
        }

        jobs::apply_group_results(pool, job_id, &results).await?;
        memory::upsert(pool, site_id, &memory_entries).await?;
        total_processed += results.len();
    }

    Ok(total_processed)
}

async fn site_id_for_job(pool: &Pool, job_id: Uuid) -> Result<Uuid> {
    sqlx::query_scalar::<_, Uuid>("SELECT site_id FROM jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(pool.inner())
        .await?
        .ok_or(PipelineError::NotFound)
}

/// Exponential backoff with jitter: `d_k = clamp(min * 2^(k-1), min, max)`
/// scaled by a uniform factor in `[1-j, 1+j]`. Retries on retryable errors
/// only; a 429 with `Retry-After` widens the first delay to that hint,
/// still bounded by `max`.
async fn translate_with_retry(
    provider: &ProviderClient,
    config: &WorkerConfig,
    texts: &[String],
    source_lang: &str,
    target_lang: &str,
) -> Result<Vec<String>> {
    let mut attempt = 0u32;
    loop {
        match provider.translate(texts, source_lang, target_lang).await {
            Ok(translations) => return Ok(translations),
            Err(err) if err.is_retryable() && attempt < config.retries => {
                let delay = backoff_delay(config, attempt, &err);
                tracing::warn!(attempt, delay_ms = %delay.as_millis(), error = %err, "retrying provider call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(config: &WorkerConfig, attempt: u32, err: &PipelineError) -> Duration {
    let min = config.backoff_min.as_millis() as f64;
    let max = config.backoff_max.as_millis() as f64;
    let base = (min * 2f64.powi(attempt as i32)).clamp(min, max);

    let base = if let PipelineError::ProviderRetryable(msg) = err {
        extract_retry_after_secs(msg)
            .map(|secs| ((secs * 1000) as f64).min(max))
            .unwrap_or(base)
    } else {
        base
    };

    let jitter = config.backoff_jitter;
    let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
    Duration::from_millis((base * factor) as u64)
}

fn extract_retry_after_secs(message: &str) -> Option<u64> {
    message
        .split("retry-after=")
        .nth(1)
        .and_then(|rest| rest.split('s').next())
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_is_bounded_by_max() {
        let config = WorkerConfig {
            worker_id: "t".into(),
            lease_seconds: 300,
            max_attempts: 5,
            idle_poll: Duration::from_millis(1),
            concurrency: 1,
            heartbeat: Duration::from_secs(60),
            retries: 3,
            backoff_min: Duration::from_millis(500),
            backoff_max: Duration::from_millis(5000),
            backoff_jitter: 0.2,
            chunk_size: 50,
        };
        for attempt in 0..10 {
            let delay = backoff_delay(&config, attempt, &PipelineError::ProviderRetryable("x".into()));
            assert!(delay.as_millis() <= 6000);
        }
    }

    #[test]
    fn extract_retry_after_parses_hint() {
        assert_eq!(extract_retry_after_secs("429 rate limited, retry-after=7s: body"), Some(7));
        assert_eq!(extract_retry_after_secs("no hint here"), None);
    }

    #[test]
    fn default_worker_id_is_nonempty_and_unique_ish() {
        let a = WorkerConfig::default_worker_id();
        let b = WorkerConfig::default_worker_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}
