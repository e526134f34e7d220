//! Application state
//!
//! Holds all shared components and state

use crate::camera_discovery::DEFAULT_SETTLE_DELAY_MS;
use crate::config_store::ConfigStore;
use crate::supervisor::Supervisor;
use crate::video_source::DEFAULT_CAPTURE_TIMEOUT_SEC;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Persisted config document
    pub config_path: PathBuf,
    /// Frontend build output, served when present
    pub static_dir: PathBuf,
    /// Wait between opening a camera and grabbing its preview
    pub settle_delay: Duration,
    /// Upper bound for a single ffmpeg capture
    pub capture_timeout: Duration,
    /// RTSP cameras to include in discovery (`RTSP_SOURCES`, comma separated)
    pub rtsp_sources: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            config_path: std::env::var("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./gl_config.json")),
            static_dir: std::env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./frontend/dist")),
            settle_delay: Duration::from_millis(
                std::env::var("SETTLE_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_SETTLE_DELAY_MS),
            ),
            capture_timeout: Duration::from_secs(
                std::env::var("CAPTURE_TIMEOUT_SEC")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CAPTURE_TIMEOUT_SEC),
            ),
            rtsp_sources: std::env::var("RTSP_SOURCES")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// ConfigStore (SSoT)
    pub config_store: Arc<ConfigStore>,
    /// Supervisor (cameras + workers)
    pub supervisor: Arc<Supervisor>,
    /// `ffmpeg -version` first line, probed once at startup
    pub ffmpeg_version: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn uptime_sec(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" rtsp://a/stream , ,rtsp://b/stream"),
            vec!["rtsp://a/stream", "rtsp://b/stream"]
        );
        assert!(parse_list("").is_empty());
    }
}
