//! CameraDiscovery - enumerate sources and grab preview stills
//!
//! ## Responsibilities
//!
//! - Full discovery: one preview per reachable source
//! - Targeted probe of a single source (with settle delay)
//! - Base64 encoding of the JPEG preview
//!
//! A source that fails is skipped (full discovery) or reported as
//! `SourceUnavailable` (probe); either way it is released.

use crate::config_store::VideoSourceConfig;
use crate::error::{Error, Result};
use crate::video_source::{SourceLease, VideoBackend};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Wait between opening a source and capturing from it, for hardware init
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Discovered camera with its preview still
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub config: VideoSourceConfig,
    /// Base64 JPEG
    pub image: String,
}

impl CameraDescriptor {
    pub fn new(config: VideoSourceConfig, jpeg: &[u8]) -> Self {
        Self {
            config,
            image: encode_preview(jpeg),
        }
    }
}

pub fn encode_preview(jpeg: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(jpeg)
}

/// CameraDiscovery instance
pub struct CameraDiscovery {
    backend: Arc<dyn VideoBackend>,
    settle_delay: Duration,
}

impl CameraDiscovery {
    pub fn new(backend: Arc<dyn VideoBackend>, settle_delay: Duration) -> Self {
        Self {
            backend,
            settle_delay,
        }
    }

    /// Capture one preview from every reachable source
    pub async fn discover_all(&self) -> Vec<CameraDescriptor> {
        let sources = match self.backend.autodiscover().await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!(error = %e, "Autodiscovery failed, no cameras found");
                return Vec::new();
            }
        };

        // lease everything up front: whatever is not reached is still released on drop
        let leases: Vec<SourceLease> = sources.into_iter().map(SourceLease::new).collect();
        let total = leases.len();
        let mut cameras = Vec::with_capacity(total);

        for mut lease in leases {
            match lease.capture().await {
                Ok(jpeg) => {
                    tracing::debug!(camera = %lease.config(), size = jpeg.len(), "Preview captured");
                    cameras.push(CameraDescriptor::new(lease.config().clone(), &jpeg));
                }
                Err(e) => {
                    tracing::warn!(camera = %lease.config(), error = %e, "Skipping camera, capture failed");
                }
            }
            lease.release();
        }

        tracing::info!(found = cameras.len(), probed = total, "Camera discovery finished");
        cameras
    }

    /// Open exactly `config`, wait the settle delay, capture once
    pub async fn probe_one(&self, config: &VideoSourceConfig) -> Result<CameraDescriptor> {
        let handle = self.backend.create_source(config).await.map_err(|e| match e {
            Error::SourceUnavailable(_) => e,
            other => Error::SourceUnavailable(format!("{}: {}", config, other)),
        })?;
        let mut lease = SourceLease::new(handle);

        tokio::time::sleep(self.settle_delay).await;

        let jpeg = lease.capture().await.map_err(|e| match e {
            Error::SourceUnavailable(_) => e,
            other => Error::SourceUnavailable(format!("{}: {}", config, other)),
        })?;
        lease.release();

        tracing::debug!(camera = %config, size = jpeg.len(), "Camera probed");
        Ok(CameraDescriptor::new(config.clone(), &jpeg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBackend;

    fn discovery(backend: &FakeBackend) -> CameraDiscovery {
        CameraDiscovery::new(Arc::new(backend.clone()), Duration::ZERO)
    }

    fn decode(image: &str) -> String {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(image)
            .unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_discover_all_returns_one_descriptor_per_source() {
        let backend = FakeBackend::new(vec![
            VideoSourceConfig::named("camA"),
            VideoSourceConfig::named("camB"),
        ]);
        let cameras = discovery(&backend).discover_all().await;

        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].config, VideoSourceConfig::named("camA"));
        assert!(decode(&cameras[0].image).starts_with("camA#"));
        assert_eq!(backend.released(), vec!["camA", "camB"]);
    }

    #[tokio::test]
    async fn test_failing_source_is_skipped_and_released() {
        let backend = FakeBackend::new(vec![
            VideoSourceConfig::named("camA"),
            VideoSourceConfig::named("camB"),
            VideoSourceConfig::named("camC"),
        ]);
        backend.fail("camB");

        let cameras = discovery(&backend).discover_all().await;
        let names: Vec<_> = cameras.iter().map(|c| c.config.name().unwrap()).collect();
        assert_eq!(names, vec!["camA", "camC"]);

        // every opened source released, failing one included, no retry
        assert_eq!(backend.opened(), vec!["camA", "camB", "camC"]);
        assert_eq!(backend.released(), vec!["camA", "camB", "camC"]);
    }

    #[tokio::test]
    async fn test_probe_one_captures_requested_source() {
        let backend = FakeBackend::new(vec![VideoSourceConfig::named("camA")]);
        let camera = discovery(&backend)
            .probe_one(&VideoSourceConfig::named("camA"))
            .await
            .unwrap();
        assert!(decode(&camera.image).starts_with("camA#"));
        assert_eq!(backend.released(), vec!["camA"]);
    }

    #[tokio::test]
    async fn test_probe_one_failure_releases_source() {
        let backend = FakeBackend::new(vec![VideoSourceConfig::named("camA")]);
        backend.fail("camA");

        let result = discovery(&backend)
            .probe_one(&VideoSourceConfig::named("camA"))
            .await;
        assert!(matches!(result, Err(Error::SourceUnavailable(_))));
        assert_eq!(backend.released(), vec!["camA"]);
    }

    #[tokio::test]
    async fn test_probe_one_unknown_source() {
        let backend = FakeBackend::new(Vec::new());
        let result = discovery(&backend)
            .probe_one(&VideoSourceConfig::named("ghost"))
            .await;
        assert!(matches!(result, Err(Error::SourceUnavailable(_))));
        assert!(backend.opened().is_empty());
    }

    #[test]
    fn test_encode_preview() {
        assert_eq!(encode_preview(b"hello"), "aGVsbG8=");
    }
}
