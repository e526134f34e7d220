//! Video source backend
//!
//! ## Responsibilities
//!
//! - Enumerate reachable sources (`autodiscover`)
//! - Open one source from its configuration (`create_source`)
//! - Single-frame JPEG capture and release
//!
//! Sources are always held through a [`SourceLease`], which releases the
//! underlying handle when dropped, so an early return or a cancelled future
//! never leaves a device open.

mod ffmpeg;

pub use ffmpeg::{ffmpeg_version, FfmpegBackend, DEFAULT_CAPTURE_TIMEOUT_SEC};

use crate::config_store::VideoSourceConfig;
use crate::error::Result;
use async_trait::async_trait;

/// One opened video source
#[async_trait]
pub trait SourceHandle: Send {
    /// Configuration identifying this source
    fn config(&self) -> &VideoSourceConfig;

    /// Capture one frame as JPEG bytes
    async fn capture(&mut self) -> Result<Vec<u8>>;

    /// Release the source. Must be safe to call more than once.
    fn release(&mut self);
}

/// Source enumeration and construction
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Every currently reachable source, already opened
    async fn autodiscover(&self) -> Result<Vec<Box<dyn SourceHandle>>>;

    /// Open exactly the source described by `config`
    async fn create_source(&self, config: &VideoSourceConfig) -> Result<Box<dyn SourceHandle>>;
}

/// Scoped ownership of an opened source - released on drop
pub struct SourceLease {
    handle: Option<Box<dyn SourceHandle>>,
    config: VideoSourceConfig,
}

impl SourceLease {
    pub fn new(handle: Box<dyn SourceHandle>) -> Self {
        let config = handle.config().clone();
        Self {
            handle: Some(handle),
            config,
        }
    }

    pub fn config(&self) -> &VideoSourceConfig {
        &self.config
    }

    pub async fn capture(&mut self) -> Result<Vec<u8>> {
        match self.handle.as_mut() {
            Some(handle) => handle.capture().await,
            None => Err(crate::Error::SourceUnavailable(format!(
                "{} already released",
                self.config
            ))),
        }
    }

    /// Release now instead of at end of scope
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
            tracing::debug!(camera = %self.config, "Video source released");
        }
    }
}

impl Drop for SourceLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}
