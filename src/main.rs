//! Camstream - camera stream session manager
//!
//! Main entry point for the server.

use camstream::{
    snapshot_service,
    state::{AppConfig, AppState},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camstream=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Camstream v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        ffmpeg = %config.ffmpeg_path.display(),
        stream_root = %config.stream_root.display(),
        snapshot_root = %config.snapshot_root.display(),
        detection_root = %config.detection_root.display(),
        analyzer_url = ?config.analyzer_url,
        "Configuration loaded"
    );

    // Create database pool
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Database connected");

    // Streams still start without ffmpeg, they just fail per request
    match snapshot_service::check_ffmpeg(&config.ffmpeg_path).await {
        Ok(version) => tracing::info!(version = %version, "ffmpeg available"),
        Err(e) => tracing::warn!(error = %e, "ffmpeg not usable"),
    }

    let analysis = config.analysis_engine()?;
    tracing::info!(analyzers = analysis.models().len(), "AnalysisEngine initialized");

    let state = AppState::with_pool(pool, config, analysis);

    if let Some(interval) = state.config.sweep_interval {
        state.stream.spawn_liveness_sweep(interval);
        tracing::info!(interval_sec = interval.as_secs(), "Liveness sweep started");
    }

    let app = web_api::create_router(state.clone());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let stream = state.stream.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Ends MJPEG bodies too, so open viewers don't hold the drain
            let stopped = stream.shutdown().await;
            tracing::info!(stopped, "All stream sessions stopped");
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl-c"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
