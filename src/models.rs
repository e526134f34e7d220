//! Shared models and types
//!
//! Request and response bodies of the HTTP API.

use crate::config_store::DetectorConfig;
use crate::supervisor::SupervisorPhase;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub phase: SupervisorPhase,
    pub cameras: usize,
    pub workers: usize,
    pub ffmpeg: Option<String>,
}

/// Body of `POST /api/new-detector`
///
/// The frontend sends the whole form; only name and query matter here.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDetectorRequest {
    pub name: String,
    pub query: String,
}

/// Body of `POST /api/config/detectors`
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorListRequest {
    pub detectors: Vec<DetectorConfig>,
}

/// Body of `POST /api/config/api_key`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyRequest {
    pub api_key: String,
}

/// Marker returned by `POST /api/new-detector` when creation fails
pub const CREATE_FAILED: &str = "Failed";
