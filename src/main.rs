//! Face enrollment and recognition service.
//!
//! REST (Axum) API over an OpenVINO-backed face extractor, SQLite
//! record storage and filesystem image storage.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use faceprint::api::rest::{create_router, AppState};
use faceprint::config::Config;
use faceprint::engine::{ModelPool, OpenVinoExtractor};
use faceprint::service::FaceService;
use faceprint::storage::{FsImageStore, SqliteStorage};

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Starting faceprint v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(Config::default_path()).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });

    info!("Configuration loaded:");
    info!("  port: {}", config.server.port);
    info!("  device: {}", config.inference.device);
    info!("  match threshold: {}", config.recognition.match_threshold);
    info!("  face policy: {:?}", config.recognition.face_policy);

    // Model pool with idle auto-unloading
    let pool = Arc::new(ModelPool::new(&config.inference, &config.models)?);
    let pool_clone = pool.clone();
    tokio::spawn(async move {
        pool_clone.start_cleanup_task().await;
    });

    let extractor = Arc::new(OpenVinoExtractor::new(
        pool.clone(),
        config.recognition.detection_confidence,
        config.recognition.embedding_dim,
        config.recognition.crop_margin,
    ));

    // Storage
    let faces = Arc::new(SqliteStorage::new(&config.storage.sqlite_path.to_string_lossy()).await?);
    let images = Arc::new(FsImageStore::new(config.storage.training_dir.clone())?);
    info!(
        "storage ready: db={}, training={}",
        config.storage.sqlite_path.display(),
        config.storage.training_dir.display()
    );

    let service = Arc::new(FaceService::new(extractor, faces, images, config.clone()));

    let state = Arc::new(AppState {
        service,
        pool: pool.clone(),
        start_time: Instant::now(),
    });
    let router = create_router(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("REST API listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown();
    info!("Goodbye!");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received, cleaning up...");
}
