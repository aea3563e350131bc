//! HTTP service exposing the pipeline over multipart uploads.
//!
//! | Method | Path             | Handler                     |
//! |--------|------------------|-----------------------------|
//! | GET    | `/health`        | [`handler::health`]         |
//! | POST   | `/ocr`           | [`handler::ocr`]            |
//! | POST   | `/extract`       | [`handler::extract`]        |
//! | POST   | `/extract-batch` | [`handler::extract_batch`]  |
//!
//! Every request gets an `x-request-id` (generated when absent, echoed on the
//! response) and is traced with method, path, status and latency.

pub mod error;
pub mod handler;

use crate::error::ExtractorError;
use crate::extract::Extractor;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<Extractor>,
    /// Whole-request body limit in bytes.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(extractor: Arc<Extractor>, max_upload_bytes: usize) -> Self {
        Self {
            extractor,
            max_upload_bytes,
        }
    }
}

/// Listener and startup options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub max_upload_mb: usize,
    /// Skip the `GET /models` check at startup.
    pub skip_llm_probe: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_mb: 25,
            skip_llm_probe: false,
        }
    }
}

impl ServerOptions {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.max(1) * 1024 * 1024
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(handler::health))
        .route("/ocr", post(handler::ocr))
        .route("/extract", post(handler::extract))
        .route("/extract-batch", post(handler::extract_batch))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .with_state(state)
}

/// Probe the model endpoint, bind, and serve until Ctrl+C or SIGTERM.
pub async fn serve(extractor: Arc<Extractor>, options: ServerOptions) -> Result<(), ExtractorError> {
    if options.skip_llm_probe {
        info!("Skipping LLM reachability probe");
    } else {
        extractor.probe().await?;
        info!(
            "LLM endpoint reachable at {} (model {})",
            extractor.config().llm_base_url,
            extractor.model()
        );
    }

    let addr = format!("{}:{}", options.host, options.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ExtractorError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(
        "Listening on http://{} (upload limit {} MB)",
        addr,
        options.max_upload_mb.max(1)
    );

    let app = router(AppState::new(extractor, options.max_upload_bytes()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ExtractorError::Serve)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutting down");
}
