//! REST API server for meetcap.
//!
//! Provides HTTP endpoints for:
//! - Recording control (start, stop, status)
//! - Service info

pub mod error;
pub mod routes;

use crate::config::Config;
use crate::coordinator::CoordinatorHandle;
use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::future::Future;
use tower::ServiceBuilder;
use tracing::info;

pub use routes::recording::RecordingState;

pub struct ApiServer {
    port: u16,
    recording_state: RecordingState,
}

impl ApiServer {
    pub fn new(coordinator: CoordinatorHandle, config: &Config) -> Self {
        Self {
            port: config.api.port,
            recording_state: RecordingState {
                coordinator,
                default_target: config.capture.default_target.clone(),
            },
        }
    }

    /// Serve until `shutdown` resolves.
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let app = router(self.recording_state);

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port))
            .await
            .with_context(|| format!("Failed to bind API port {}", self.port))?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /        - Service info");
        info!("  POST /start   - Start recording");
        info!("  POST /stop    - Stop recording");
        info!("  GET  /status  - Get recording status");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// The full application router.
pub fn router(recording_state: RecordingState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .merge(routes::recording::router(recording_state))
        .layer(ServiceBuilder::new())
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "meetcap",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
