//! Dedup ledger for billing webhook deliveries. Append-only, keyed by the
//! provider's own event id so a replayed delivery is a no-op rather than a
//! double-apply.

use std::time::Instant;

use serde_json::Value;

use crate::db::pool::Pool;
use crate::error::Result;

/// Record `event_id` if it hasn't been seen before. Returns `true` when this
/// call inserted the row (first delivery), `false` when it already existed
/// (a replay) — callers use this to decide whether to apply side effects.
pub async fn record_if_new(
    pool: &Pool,
    event_id: &str,
    event_name: &str,
    payload: &Value,
) -> Result<bool> {
    let start = Instant::now();
    let result = sqlx::query(
        r#"
        INSERT INTO webhook_events (event_id, event_name, payload)
        VALUES ($1, $2, $3)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(event_id)
    .bind(event_name)
    .bind(payload)
    .execute(pool.inner())
    .await;
    pool.record_query(start.elapsed(), result.is_ok());

    Ok(result?.rows_affected() == 1)
}
