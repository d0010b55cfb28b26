//! Lease Queue (C5): at-most-one-worker-at-a-time claim discipline over jobs.
//!
//! Each operation here is one statement executed inside a transaction that
//! takes `FOR UPDATE SKIP LOCKED` on the candidate row — the one substitute
//! for a message bus a plain relational table can offer. A naive
//! `SELECT ... LIMIT 1` followed by `UPDATE` races under concurrent workers;
//! this does not.

use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::pool::Pool;
use crate::error::Result;

pub struct Claimed {
    pub job_id: Uuid,
    pub lock_token: Uuid,
    pub attempts: i32,
}

/// Claim the single oldest claimable queue row (FIFO by `enqueued_at`),
/// stamp a fresh lease and lock token, bump `attempts`, and flip the job to
/// `processing`. Returns `None` if nothing is claimable right now.
pub async fn claim(pool: &Pool, worker_id: &str, lease_seconds: i64) -> Result<Option<Claimed>> {
    let mut tx = pool.inner().begin().await?;

    let row = sqlx::query_as::<_, (Uuid, i32)>(
        r#"
        SELECT job_id, attempts
        FROM queue
        WHERE processed = false
          AND (lease_expires_at IS NULL OR lease_expires_at < now())
        ORDER BY enqueued_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some((job_id, attempts)) = row else {
        tx.commit().await?;
        return Ok(None);
    };

    let lock_token = Uuid::new_v4();
    let new_attempts = attempts + 1;

    sqlx::query(
        r#"
        UPDATE queue SET
            locked_by = $2,
            locked_at = now(),
            lease_expires_at = now() + make_interval(secs => $3),
            lock_token = $4,
            attempts = $5
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .bind(worker_id)
    .bind(lease_seconds as f64)
    .bind(lock_token)
    .bind(new_attempts)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE jobs SET
            status = 'processing',
            started_at = COALESCE(started_at, now())
        WHERE id = $1 AND status != 'processing'
        "#,
    )
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Some(Claimed { job_id, lock_token, attempts: new_attempts }))
}

/// Same as `claim` but targets one specific job; returns `None` if it is not
/// currently claimable (already leased, or already processed).
pub async fn claim_by_id(
    pool: &Pool,
    job_id: Uuid,
    worker_id: &str,
    lease_seconds: i64,
) -> Result<Option<Claimed>> {
    let mut tx = pool.inner().begin().await?;

    let row = sqlx::query_as::<_, (i32,)>(
        r#"
        SELECT attempts
        FROM queue
        WHERE job_id = $1
          AND processed = false
          AND (lease_expires_at IS NULL OR lease_expires_at < now())
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(job_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((attempts,)) = row else {
        tx.commit().await?;
        return Ok(None);
    };

    let lock_token = Uuid::new_v4();
    let new_attempts = attempts + 1;

    sqlx::query(
        r#"
        UPDATE queue SET
            locked_by = $2, locked_at = now(),
            lease_expires_at = now() + make_interval(secs => $3),
            lock_token = $4, attempts = $5
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .bind(worker_id)
    .bind(lease_seconds as f64)
    .bind(lock_token)
    .bind(new_attempts)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE jobs SET status = 'processing', started_at = COALESCE(started_at, now()) WHERE id = $1 AND status != 'processing'",
    )
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(Claimed { job_id, lock_token, attempts: new_attempts }))
}

/// Release a held lease back to claimable, returning the job to `pending`.
/// Returns `true` iff exactly one row matched — a mismatched token means the
/// lease already expired and was claimed by someone else; the caller must
/// not also Complete.
pub async fn release(
    pool: &Pool,
    job_id: Uuid,
    lock_token: Uuid,
    error_text: Option<&str>,
) -> Result<bool> {
    let mut tx = pool.inner().begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE queue SET
            locked_by = NULL, locked_at = NULL,
            lease_expires_at = NULL, lock_token = NULL,
            last_error = $3
        WHERE job_id = $1 AND lock_token = $2 AND processed = false
        "#,
    )
    .bind(job_id)
    .bind(lock_token)
    .bind(error_text)
    .execute(&mut *tx)
    .await?;

    let matched = result.rows_affected() == 1;

    if matched {
        sqlx::query("UPDATE jobs SET status = 'pending', last_error = $2 WHERE id = $1")
            .bind(job_id)
            .bind(error_text)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(matched)
}

/// Mark a claimed job terminal, either `completed` or `failed`. Returns
/// `true` iff exactly one queue row matched the token.
pub async fn complete(
    pool: &Pool,
    job_id: Uuid,
    lock_token: Uuid,
    success: bool,
    error_text: Option<&str>,
) -> Result<bool> {
    let mut tx = pool.inner().begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE queue SET
            processed = true, processed_at = now(),
            locked_by = NULL, locked_at = NULL,
            lease_expires_at = NULL, lock_token = NULL,
            last_error = $3
        WHERE job_id = $1 AND lock_token = $2 AND processed = false
        "#,
    )
    .bind(job_id)
    .bind(lock_token)
    .bind(error_text)
    .execute(&mut *tx)
    .await?;

    let matched = result.rows_affected() == 1;

    if matched {
        if success {
            sqlx::query(
                "UPDATE jobs SET status = 'completed', completed_at = now() WHERE id = $1",
            )
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "UPDATE jobs SET status = 'failed', failed_at = now(), last_error = $2 WHERE id = $1",
            )
            .bind(job_id)
            .bind(error_text)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(matched)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueRow {
    pub job_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub processed: bool,
    pub attempts: i32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub lock_token: Option<Uuid>,
    pub last_error: Option<String>,
}

pub async fn read(pool: &Pool, job_id: Uuid) -> Result<Option<QueueRow>> {
    let start = Instant::now();
    let result = sqlx::query_as::<_, QueueRow>("SELECT * FROM queue WHERE job_id = $1")
        .bind(job_id)
        .fetch_optional(pool.inner())
        .await;
    pool.record_query(start.elapsed(), result.is_ok());
    Ok(result?)
}
