//! Intake Coordinator (C6) against a real Postgres instance: idempotency-key
//! collision, ON CONFLICT DO NOTHING re-intake, and cross-product cache-hit
//! counting once prior translations exist in memory.

mod common;

use translate_pipeline::config::AppConfig;
use translate_pipeline::db::memory::{self, MemoryEntry};
use translate_pipeline::fetch::Fetcher;
use translate_pipeline::intake::{HtmlSource, Intake};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> Arc<AppConfig> {
    Arc::new(AppConfig {
        bind_addr: "0.0.0.0:0".into(),
        translate_api_key: "k".into(),
        worker_run_secret: "k".into(),
        lemonsqueezy_webhook_secret: "k".into(),
        database_url: String::new(),
        db_service_key: String::new(),
        db_min_connections: 1,
        db_max_connections: 5,
        db_connect_timeout: Duration::from_secs(5),
        db_health_check_interval: Duration::from_secs(30),
        migrate_on_startup: false,
        provider_api_key: None,
        provider_base_url: "http://localhost".into(),
        provider_timeout: Duration::from_secs(5),
        provider_max_retries: 3,
        mock_provider: true,
        fetch_timeout: Duration::from_secs(5),
        max_html_bytes: 2 * 1024 * 1024,
        max_pages_per_minute: 100,
        max_segments: 5000,
        max_segment_target_pairs: 20000,
        worker_lease_seconds: 300,
        worker_max_job_attempts: 5,
        worker_idle_poll: Duration::from_millis(100),
        worker_concurrency: 1,
        worker_heartbeat: Duration::from_secs(60),
        token_enc_key: None,
    })
}

#[tokio::test]
async fn repeat_idempotency_key_returns_same_job() {
    let Some(pool) = common::test_pool().await else { return };
    let site_id = common::new_site_id();
    let fetcher = Fetcher::new(Duration::from_secs(5), 2 * 1024 * 1024);
    let intake = Intake::new(pool.clone(), fetcher, test_config());

    let html = "<p>Hello world, this is a test.</p>";
    let targets = vec!["es".to_string()];

    let first = intake
        .admit(site_id, HtmlSource::Inline(html), &targets, Some("order-1"))
        .await
        .expect("first admit should succeed");
    assert!(first.job_id.is_some());

    let second = intake
        .admit(site_id, HtmlSource::Inline(html), &targets, Some("order-1"))
        .await
        .expect("second admit should succeed");

    assert_eq!(first.job_id, second.job_id, "same idempotency key must return the existing job");
}

#[tokio::test]
async fn cached_segments_reduce_to_translate_count() {
    let Some(pool) = common::test_pool().await else { return };
    let site_id = common::new_site_id();
    let fetcher = Fetcher::new(Duration::from_secs(5), 2 * 1024 * 1024);
    let intake = Intake::new(pool.clone(), fetcher, test_config());

    let html = "<p>Already translated segment.</p><p>Brand new segment.</p>";
    let segments = translate_pipeline::segmenter::segment(html);
    assert_eq!(segments.len(), 2);

    memory::upsert(
        &pool,
        site_id,
        &[MemoryEntry {
            segment_hash: segments[0].id.clone(),
            source_lang: "auto".into(),
            target_lang: "fr".into(),
            text: "Segment déjà traduit.".into(),
        }],
    )
    .await
    .unwrap();

    let result = intake
        .admit(site_id, HtmlSource::Inline(html), &vec!["fr".to_string()], None)
        .await
        .unwrap();

    assert_eq!(result.cached_count, 1);
    assert_eq!(result.to_translate_count, 1);
    assert!(result.job_id.is_some());
}

#[tokio::test]
async fn fully_cached_html_creates_no_job() {
    let Some(pool) = common::test_pool().await else { return };
    let site_id = common::new_site_id();
    let fetcher = Fetcher::new(Duration::from_secs(5), 2 * 1024 * 1024);
    let intake = Intake::new(pool.clone(), fetcher, test_config());

    let html = "<p>Fully cached sentence here.</p>";
    let segments = translate_pipeline::segmenter::segment(html);

    memory::upsert(
        &pool,
        site_id,
        &[MemoryEntry {
            segment_hash: segments[0].id.clone(),
            source_lang: "auto".into(),
            target_lang: "de".into(),
            text: "Komplett zwischengespeicherter Satz hier.".into(),
        }],
    )
    .await
    .unwrap();

    let result = intake
        .admit(site_id, HtmlSource::Inline(html), &vec!["de".to_string()], None)
        .await
        .unwrap();

    assert_eq!(result.job_id, None);
    assert_eq!(result.to_translate_count, 0);
    assert_eq!(result.cached_count, 1);
}
