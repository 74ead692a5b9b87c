use crate::config::{self, Config};
use crate::fetch::{Extractor, YtDlpExtractor};
use crate::jobs::dispatcher::Dispatcher;
use crate::jobs::worker::{JobPipeline, WorkerPool};
use crate::qr::PngQrGenerator;
use crate::store::JobStore;
use crate::transcode::FfmpegTranscoder;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub mod files;
pub mod routes;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: JobStore,
    pub dispatcher: Arc<Dispatcher>,
    pub extractor: Arc<dyn Extractor>,
    /// Externally reachable base URL, resolved once at startup.
    pub public_url: String,
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let mut app = Router::new()
        .route("/health", get(routes::health))
        .route("/info", post(routes::info))
        .route("/download", post(routes::download))
        .route("/share/:job_id", get(routes::share))
        .route("/dl/:job_id", get(files::serve_latest))
        .route("/file/:job_id/:filename", get(files::serve_file))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // The presentation layer is just a static directory served as-is.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            app = app
                .fallback_service(ServeDir::new(&dir).append_index_html_on_directories(true));
        }
    }

    app
}

/// Wire up the store, adapters and worker pool, then run the HTTP server
/// until a shutdown signal arrives.
pub async fn start_server(config: Config) -> Result<()> {
    let public_url = config::resolve_public_url(&config);

    let store = JobStore::open(&config.storage.downloads_dir)?;
    match store.recover() {
        Ok(0) => {}
        Ok(count) => tracing::info!("Marked {} interrupted jobs from previous session", count),
        Err(e) => tracing::warn!("Failed to sweep job records: {}", e),
    }

    for tool in crate::tools::check_tools(&config.tools) {
        if !tool.available {
            tracing::warn!("External tool '{}' not found on PATH", tool.name);
        }
    }

    let extractor: Arc<dyn Extractor> =
        Arc::new(YtDlpExtractor::new(&config.tools, &config.jobs));
    let transcoder = Arc::new(FfmpegTranscoder::new(&config.tools, &config.jobs));
    let qr = Arc::new(PngQrGenerator);

    let (queue_tx, queue_rx) = async_channel::bounded(config.jobs.queue_capacity);
    let pipeline = Arc::new(JobPipeline::new(
        store.clone(),
        extractor.clone(),
        transcoder,
        qr,
        public_url.clone(),
    ));
    let pool = WorkerPool::spawn(config.jobs.workers, queue_rx, pipeline);
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), queue_tx.clone()));

    let ctx = AppContext {
        config: Arc::new(config.clone()),
        store,
        dispatcher,
        extractor,
        public_url: public_url.clone(),
    };

    let app = create_router(ctx, config.server.static_dir.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    tracing::info!("Starting server on {} (public url {})", addr, public_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop accepting jobs and let in-flight pipelines drain.
    queue_tx.close();
    pool.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
