//! Process entry point: loads configuration, connects the pool, runs
//! migrations, and then drives both the HTTP API surface and a standing
//! worker loop side by side under one shutdown signal. Deployments that
//! prefer to trigger the worker externally instead (a scheduled function
//! hitting `/worker/run`) can set `WORKER_CONCURRENCY=0` to skip the
//! in-process loop entirely.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use translate_pipeline::api::{routes::build_router, AppState};
use translate_pipeline::config::AppConfig;
use translate_pipeline::db::{self, Pool, PoolConfig};
use translate_pipeline::worker::WorkerLoop;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(AppConfig::from_env()?);

    tracing::info!(
        bind_addr = %config.bind_addr,
        mock_provider = config.mock_provider,
        "starting translate-pipeline"
    );

    let pool = Pool::new(PoolConfig {
        url: config.database_url.clone(),
        service_key: Some(config.db_service_key.clone()),
        min_connections: config.db_min_connections,
        max_connections: config.db_max_connections,
        connect_timeout: config.db_connect_timeout,
        health_check_interval: config.db_health_check_interval,
        ..PoolConfig::default()
    })
    .await?;

    if config.migrate_on_startup {
        tracing::info!("running database migrations");
        db::run_migrations(&pool).await?;
    }

    pool.start_health_check_task(config.db_health_check_interval);

    let state = Arc::new(AppState::new(pool.clone(), config.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = if config.worker_concurrency > 0 {
        let worker = WorkerLoop::new(pool.clone(), state.provider.clone(), state.worker_config.clone());
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let outcomes = worker.run(rx, false, None).await;
            tracing::info!(count = outcomes.len(), "worker loop exited");
        }))
    } else {
        tracing::info!("WORKER_CONCURRENCY=0, not starting the in-process worker loop");
        None
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let router = build_router(state);

    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    if let Some(handle) = worker_handle {
        let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, draining in-flight work");
    let _ = shutdown_tx.send(true);
}
