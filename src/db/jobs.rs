//! Job Store (C4): durable record of jobs and their pending fragment×locale
//! work units. Every write goes through one of the named transitions below;
//! nothing here issues an ad-hoc `UPDATE jobs SET status = ...`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::db::pool::Pool;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::str::FromStr for JobStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(PipelineError::Internal(format!("unknown job status {other}"))),
        }
    }
}

impl Job {
    pub fn status_enum(&self) -> Result<JobStatus> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub site_id: Uuid,
    pub source_url: Option<String>,
    pub status: String,
    pub idempotency_key: Option<String>,
    pub requested_segments: i32,
    pub translated_segments: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkUnit {
    pub id: Uuid,
    pub seq: i64,
    pub job_id: Uuid,
    pub source_lang: String,
    pub target_lang: String,
    pub segment_hash: String,
    pub source_text: String,
    pub translated_text: Option<String>,
}

pub struct NewWorkUnit {
    pub source_lang: String,
    pub target_lang: String,
    pub segment_hash: String,
    pub source_text: String,
}

/// Create a job in `pending`, insert its work units, and arm the queue entry,
/// all in one transaction. Returns the existing job id without writing
/// anything further if `idempotency_key` already exists for this site.
pub async fn create_job_with_units(
    pool: &Pool,
    site_id: Uuid,
    source_url: Option<&str>,
    idempotency_key: Option<&str>,
    units: &[NewWorkUnit],
) -> Result<Uuid> {
    let mut tx = pool.inner().begin().await?;

    if let Some(key) = idempotency_key {
        if let Some(existing) = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM jobs WHERE site_id = $1 AND idempotency_key = $2",
        )
        .bind(site_id)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?
        {
            tx.commit().await?;
            return Ok(existing);
        }
    }

    let job_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO jobs (site_id, source_url, status, idempotency_key, requested_segments)
        VALUES ($1, $2, 'pending', $3, $4)
        RETURNING id
        "#,
    )
    .bind(site_id)
    .bind(source_url)
    .bind(idempotency_key)
    .bind(units.len() as i32)
    .fetch_one(&mut *tx)
    .await?;

    insert_units(&mut tx, job_id, units).await?;
    arm_queue_entry(&mut tx, job_id).await?;

    tx.commit().await?;
    Ok(job_id)
}

async fn insert_units(
    tx: &mut Transaction<'_, Postgres>,
    job_id: Uuid,
    units: &[NewWorkUnit],
) -> Result<()> {
    for unit in units {
        sqlx::query(
            r#"
            INSERT INTO work_units (job_id, source_lang, target_lang, segment_hash, source_text)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id, segment_hash, target_lang) DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(&unit.source_lang)
        .bind(&unit.target_lang)
        .bind(&unit.segment_hash)
        .bind(&unit.source_text)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn arm_queue_entry(tx: &mut Transaction<'_, Postgres>, job_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO queue (job_id, enqueued_at, processed)
        VALUES ($1, now(), false)
        ON CONFLICT (job_id) DO UPDATE SET
            processed = false,
            processed_at = NULL,
            enqueued_at = now(),
            locked_at = NULL,
            locked_by = NULL,
            lease_expires_at = NULL,
            lock_token = NULL
        "#,
    )
    .bind(job_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn read_job(pool: &Pool, site_id: Uuid, job_id: Uuid) -> Result<Job> {
    let start = Instant::now();
    let result = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 AND site_id = $2")
        .bind(job_id)
        .bind(site_id)
        .fetch_optional(pool.inner())
        .await;
    pool.record_query(start.elapsed(), result.is_ok());
    result?.ok_or(PipelineError::NotFound)
}

/// Returns a job's work units ordered by `seq` — their insertion (document)
/// order — so callers that reconstruct per-locale text don't have to re-sort.
pub async fn read_units(pool: &Pool, job_id: Uuid) -> Result<Vec<WorkUnit>> {
    let start = Instant::now();
    let result = sqlx::query_as::<_, WorkUnit>("SELECT * FROM work_units WHERE job_id = $1 ORDER BY seq ASC")
        .bind(job_id)
        .fetch_all(pool.inner())
        .await;
    pool.record_query(start.elapsed(), result.is_ok());
    Ok(result?)
}

pub async fn count_translated(pool: &Pool, job_id: Uuid) -> Result<(i64, i64)> {
    let start = Instant::now();
    let result = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            count(*) FILTER (WHERE translated_text IS NOT NULL),
            count(*)
        FROM work_units WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_one(pool.inner())
    .await;
    pool.record_query(start.elapsed(), result.is_ok());
    Ok(result?)
}

/// Persist translated text for a batch of work units and update the job's
/// running `translated_segments` counter. Applied once per target-language
/// group so partial progress survives a later group's failure.
pub async fn apply_group_results(
    pool: &Pool,
    job_id: Uuid,
    results: &[(Uuid, String)],
) -> Result<()> {
    if results.is_empty() {
        return Ok(());
    }
    let mut tx = pool.inner().begin().await?;
    for (unit_id, text) in results {
        sqlx::query("UPDATE work_units SET translated_text = $1 WHERE id = $2")
            .bind(text)
            .bind(unit_id)
            .execute(&mut *tx)
            .await?;
    }
    let (completed, _total) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            count(*) FILTER (WHERE translated_text IS NOT NULL),
            count(*)
        FROM work_units WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query("UPDATE jobs SET translated_segments = $1 WHERE id = $2")
        .bind(completed as i32)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
