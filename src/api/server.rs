//! HTTP server for the status API

use crate::api::handlers;
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Status API server manager
pub struct ApiServer {
    state: Arc<AppState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ApiServer {
    /// Create a new server
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            shutdown_tx: None,
        }
    }

    /// Build the router
    pub fn router(state: Arc<AppState>) -> Router {
        // Build CORS layer (read-only API, any origin)
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(handlers::health_check))
            .route("/", get(handlers::health_check))
            .route("/api/v1/batches/:batch_no/reports", get(handlers::get_batch))
            .route("/api/v1/reports/:batch_no/:report_id", get(handlers::get_report))
            .route("/api/v1/market/:ticker", get(handlers::get_market))
            .with_state(state)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in the background
    pub async fn start(&mut self) -> Result<JoinHandle<()>> {
        let host = self.state.config.api_host.clone();
        let port = self.state.config.api_port;

        // Parse address
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid address {}:{}: {}", host, port, e)))?;

        let app = Self::router(self.state.clone());

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        info!("Starting status API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        // Spawn server task
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("API server shutting down");
            });

            if let Err(e) = server.await {
                error!("API server error: {}", e);
            }
        });

        info!("=== Endpoints ===");
        info!("  GET  http://{}:{}/health", host, port);
        info!("  GET  http://{}:{}/api/v1/batches/{{batch_no}}/reports", host, port);
        info!("  GET  http://{}:{}/api/v1/reports/{{batch_no}}/{{report_id}}", host, port);
        info!("  GET  http://{}:{}/api/v1/market/{{ticker}}", host, port);

        Ok(handle)
    }

    /// Stop the server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            info!("API server stop signal sent");
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop();
    }
}
