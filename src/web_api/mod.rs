//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes (`/api/...`)
//! - Mapping supervisor and detector service results to responses
//!
//! Failures talking to the detector service never surface as HTTP errors:
//! listing returns `[]` and creation returns `"Failed"`.

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.uptime_sec(),
        phase: state.supervisor.phase(),
        cameras: state.supervisor.camera_count().await,
        workers: state.supervisor.live_worker_count(),
        ffmpeg: state.ffmpeg_version.clone(),
    })
}
