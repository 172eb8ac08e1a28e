//! Recording control endpoints.
//!
//! Provides HTTP endpoints for:
//! - Starting a recording (POST /start)
//! - Stopping a recording (POST /stop)
//! - Getting recording status (GET /status)

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tracing::{info, warn};

use crate::api::error::ApiResult;
use crate::coordinator::{
    CoordinatorHandle, StartRequest, StartResponse, StatusResponse, StopResponse,
};

#[derive(Clone)]
pub struct RecordingState {
    pub coordinator: CoordinatorHandle,
    /// Target used when a start request does not name one
    pub default_target: String,
}

/// Creates the recording router with all recording-related endpoints.
pub fn router(state: RecordingState) -> Router {
    Router::new()
        .route("/start", post(start_recording))
        .route("/stop", post(stop_recording))
        .route("/status", get(recording_status))
        .with_state(state)
}

/// Starts a recording of the given capture target.
///
/// # Request Body
/// Optional JSON `{"targetId": "..."}`; the configured default target is used
/// when absent.
///
/// # Response
/// `{"success": true}` on success. A refused start answers
/// `422 Unprocessable Entity` with `{"success": false, "error": "..."}`.
async fn start_recording(
    State(state): State<RecordingState>,
    body: Option<Json<StartRequest>>,
) -> ApiResult<(StatusCode, Json<StartResponse>)> {
    let target_id = body
        .and_then(|Json(req)| req.target_id)
        .filter(|target| !target.trim().is_empty())
        .unwrap_or_else(|| state.default_target.clone());

    info!("Start command received via API for target {:?}", target_id);

    let response = state.coordinator.start(target_id).await?;
    let status = if response.success {
        StatusCode::OK
    } else {
        warn!(
            "Start refused: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
        StatusCode::UNPROCESSABLE_ENTITY
    };

    Ok((status, Json(response)))
}

/// Stops the current recording. Succeeds when nothing is recording.
async fn stop_recording(State(state): State<RecordingState>) -> ApiResult<Json<StopResponse>> {
    info!("Stop command received via API");
    Ok(Json(state.coordinator.stop().await?))
}

/// Gets the reconciled recording status.
async fn recording_status(
    State(state): State<RecordingState>,
) -> ApiResult<Json<StatusResponse>> {
    Ok(Json(state.coordinator.status().await?))
}
