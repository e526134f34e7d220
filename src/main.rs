//! detector-hub
//!
//! Main entry point. `serve` (the default) runs the HTTP API and the
//! supervisor; `worker` is what the supervisor spawns for each detector.

use clap::{Parser, Subcommand};
use detector_hub::{
    camera_discovery::CameraDiscovery,
    config_store::ConfigStore,
    state::{AppConfig, AppState},
    supervisor::Supervisor,
    video_source::{ffmpeg_version, FfmpegBackend, VideoBackend},
    web_api,
    worker_manager::{ProcessSpawner, WorkerManager, WorkerSpec},
    worker_runtime::WorkerRuntime,
};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "detector-hub")]
#[command(about = "Camera discovery and detector worker supervisor", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and supervise workers (default)
    Serve,
    /// Run one detector worker; reads its spec as JSON from stdin
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "detector_hub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::default();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Worker => worker(config).await,
    }
}

fn video_backend(config: &AppConfig) -> Arc<dyn VideoBackend> {
    Arc::new(FfmpegBackend::new(
        config.rtsp_sources.clone(),
        config.capture_timeout,
    ))
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting detector-hub v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config_path = %config.config_path.display(),
        rtsp_sources = config.rtsp_sources.len(),
        settle_delay_ms = config.settle_delay.as_millis() as u64,
        "Configuration loaded"
    );

    let ffmpeg = match ffmpeg_version().await {
        Ok(version) => {
            tracing::info!(version = %version, "ffmpeg available");
            Some(version)
        }
        Err(e) => {
            tracing::warn!(error = %e, "ffmpeg not available, cameras cannot be captured");
            None
        }
    };

    let config_store = Arc::new(ConfigStore::open(&config.config_path).await);
    let discovery = CameraDiscovery::new(video_backend(&config), config.settle_delay);
    let workers = WorkerManager::new(Arc::new(ProcessSpawner::current_exe()?));
    let supervisor = Arc::new(Supervisor::new(config_store.clone(), discovery, workers));

    supervisor.bootstrap().await;

    let state = AppState {
        config: config.clone(),
        config_store,
        supervisor: supervisor.clone(),
        ffmpeg_version: ffmpeg,
        started_at: chrono::Utc::now(),
    };

    let mut app = web_api::create_router(state);
    if config.static_dir.is_dir() {
        let index = config.static_dir.join("index.html");
        let serve_dir = ServeDir::new(&config.static_dir).not_found_service(ServeFile::new(index));
        app = app.fallback_service(serve_dir);
        tracing::info!(static_dir = %config.static_dir.display(), "Static file serving enabled");
    }
    let app = app
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.shutdown().await;
    Ok(())
}

async fn worker(config: AppConfig) -> anyhow::Result<()> {
    let mut raw = Vec::new();
    tokio::io::stdin().read_to_end(&mut raw).await?;
    let spec: WorkerSpec = serde_json::from_slice(&raw)?;

    tracing::info!(detector = %spec.detector.name, pid = std::process::id(), "Worker starting");

    WorkerRuntime::new(spec, video_backend(&config))?.run().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping workers");
}
