// Main entry point for the screenshot analysis server

use snapsort::{
    core::Config,
    orchestration::BatchOrchestrator,
    server::{build_router, AppState},
    services::VisionClient,
    utils::Metrics,
};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    let level = match config.log_level() {
        tracing::Level::TRACE => "trace",
        tracing::Level::DEBUG => "debug",
        tracing::Level::INFO => "info",
        tracing::Level::WARN => "warn",
        tracing::Level::ERROR => "error",
    };
    let filter = EnvFilter::new(format!(
        "snapsort={level},snapsort_server={level},tower_http=warn"
    ));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== SNAPSORT SCREENSHOT ANALYZER ===");
    info!("Config: {}", config.summary());

    let metrics = Metrics::new();

    let orchestrator = match config.api_key() {
        Some(api_key) => {
            let client = VisionClient::openai(&config, api_key, Some(metrics.clone()))?;
            let orchestrator = BatchOrchestrator::new(Arc::new(client), &config.batch)
                .with_metrics(metrics.clone());
            Some(Arc::new(orchestrator))
        }
        None => {
            warn!("OPENAI_API_KEY is not set; /analyze will fail until it is configured");
            None
        }
    };

    let state = AppState::new(config.clone(), orchestrator, metrics);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /         - Root endpoint");
    info!("  GET  /health   - Health check");
    info!("  GET  /metrics  - Prometheus metrics");
    info!("  GET  /stats    - Detailed statistics");
    info!("  POST /analyze  - Analyze screenshots (multipart/form-data, field \"files\")");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
