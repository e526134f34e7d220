//! detector-hub Library
//!
//! Camera discovery and detector worker supervision behind a small HTTP API.
//!
//! ## Architecture (8 Components)
//!
//! 1. ConfigStore - SSoT for credentials and the detector list
//! 2. VideoSource - Video backend (ffmpeg webcams / RTSP)
//! 3. CameraDiscovery - Source enumeration and preview stills
//! 4. WorkerManager - One isolated worker process per enabled detector
//! 5. WorkerRuntime - Capture loop inside a worker
//! 6. DetectorClient - Detector service adapter
//! 7. Supervisor - Serialized worker/camera transitions
//! 8. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - SSoT: ConfigStore is the single source of truth
//! - One transition at a time: every worker swap goes through the Supervisor

pub mod camera_discovery;
pub mod config_store;
pub mod detector_client;
pub mod error;
pub mod models;
pub mod state;
pub mod supervisor;
pub mod video_source;
pub mod web_api;
pub mod worker_manager;
pub mod worker_runtime;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
pub use state::AppState;
