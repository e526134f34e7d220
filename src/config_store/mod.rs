//! ConfigStore - Single Source of Truth (SSoT)
//!
//! ## Responsibilities
//!
//! - Credentials and detector list persistence
//! - Recovery from a missing or corrupt document
//! - Pretty exports (JSON / YAML) without preview images
//!
//! ## Design Principles
//!
//! - SSoT: every read and write of the document goes through here
//! - The document is always rewritten whole, never patched

mod repository;
mod source_config;
mod types;

pub use repository::{to_pretty_json, ConfigRepository};
pub use source_config::{SourceValue, VideoSourceConfig};
pub use types::*;

use crate::error::Result;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// ConfigStore instance
pub struct ConfigStore {
    repo: ConfigRepository,
    /// In-memory copy of the last written document
    cache: RwLock<ConfigDocument>,
}

impl ConfigStore {
    /// Open the document at `path`
    ///
    /// A missing or unparseable document is replaced by an empty one, which is
    /// written back immediately. An unparseable file is first copied to
    /// `<file>.bad`. Failing to write it back is logged; the store
    /// still comes up with the empty document in memory.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let repo = ConfigRepository::new(path);

        let doc = match repo.load().await {
            Ok(doc) => {
                tracing::info!(
                    path = %repo.path().display(),
                    detectors = doc.detectors.len(),
                    "Config loaded"
                );
                doc
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, resetting to empty document");
                match repo.back_up().await {
                    Ok(Some(backup)) => {
                        tracing::warn!(backup = %backup.display(), "Unreadable config kept aside");
                    }
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %e, "Failed to keep unreadable config aside"),
                }
                let empty = ConfigDocument::default();
                if let Err(e) = repo.save(&empty).await {
                    tracing::error!(error = %e, "Failed to write empty config document");
                }
                empty
            }
        };

        Self {
            repo,
            cache: RwLock::new(doc),
        }
    }

    /// Current document
    pub async fn document(&self) -> ConfigDocument {
        self.cache.read().await.clone()
    }

    pub async fn credentials(&self) -> Credentials {
        self.cache.read().await.credentials()
    }

    /// Replace the detector list, keeping credentials
    ///
    /// The in-memory copy is updated even when the write fails, so the
    /// running system and `document()` agree; the error is still returned.
    pub async fn replace_detectors(&self, detectors: Vec<DetectorConfig>) -> Result<ConfigDocument> {
        let mut cache = self.cache.write().await;
        cache.detectors = detectors;
        self.repo.save(&cache).await?;
        tracing::info!(detectors = cache.detectors.len(), "Detector list replaced");
        Ok(cache.clone())
    }

    /// Store a new API key
    pub async fn set_api_key(&self, api_key: String) -> Result<ConfigDocument> {
        let mut cache = self.cache.write().await;
        cache.api_key = Some(api_key);
        self.repo.save(&cache).await?;
        tracing::info!("API key updated");
        Ok(cache.clone())
    }

    /// Document as pretty JSON, preview images removed
    pub async fn pretty_json(&self) -> Result<String> {
        let stripped = self.cache.read().await.without_previews()?;
        to_pretty_json(&stripped)
    }

    /// Document as YAML, preview images removed
    pub async fn pretty_yaml(&self) -> Result<String> {
        let stripped = self.cache.read().await.without_previews()?;
        Ok(serde_yaml::to_string(&stripped)?)
    }
}
