//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vidshift_api::{create_router, metrics, ApiConfig, AppState};
use vidshift_media::{check_ffmpeg, check_ffprobe, FfmpegFrameProcessor, FfmpegRunner};
use vidshift_store::connect_job_store;
use vidshift_worker::{JobService, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vidshift=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vidshift-api");

    let config = ApiConfig::from_env();
    let service_config = ServiceConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    if let Err(e) = check_ffmpeg().and_then(|_| check_ffprobe()) {
        warn!("{}; jobs will fail until it is installed", e);
    }

    service_config
        .ensure_dirs()
        .await
        .context("Failed to create storage folders")?;

    let store = connect_job_store(&service_config.redis_url).await;
    info!("Job store backend: {}", store.backend_name());

    let service = JobService::new(
        service_config,
        store,
        Arc::new(FfmpegRunner::new()),
        Arc::new(FfmpegFrameProcessor::new()),
    );

    let report = service.enforce_retention().await;
    info!("Startup retention removed {} files", report.deleted.len());

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    let state = AppState::new(config.clone(), service);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = config.bind_address().parse().context("Invalid bind address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
