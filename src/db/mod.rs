//! Database layer: pooled Postgres access plus the three repositories the
//! pipeline is built on (jobs/work-units, translation memory, lease queue).

pub mod jobs;
pub mod memory;
pub mod pool;
pub mod queue;
pub mod webhook_events;

pub use pool::{Pool, PoolConfig, PoolStats};

/// Apply embedded SQL migrations. Called once at startup, gated by
/// `MIGRATE_ON_STARTUP` (default true).
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool.inner()).await
}
