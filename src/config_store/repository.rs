//! ConfigStore Repository
//!
//! File access for the persisted config document

use super::types::ConfigDocument;
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Reads and rewrites the config document at a fixed path
pub struct ConfigRepository {
    path: PathBuf,
}

impl ConfigRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document
    ///
    /// `ConfigUnreadable` covers a missing file, invalid JSON, and JSON whose
    /// shape is not a document at all (for example `detectors` not being a
    /// list). Odd values inside a detector are tolerated by the types.
    pub async fn load(&self) -> Result<ConfigDocument> {
        let raw = fs::read(&self.path).await.map_err(|e| {
            Error::ConfigUnreadable(format!("{}: {}", self.path.display(), e))
        })?;

        let value: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|e| Error::ConfigUnreadable(format!("{}: {}", self.path.display(), e)))?;

        serde_json::from_value(value).map_err(|e| {
            Error::ConfigUnreadable(format!("{}: not a config document: {}", self.path.display(), e))
        })
    }

    /// Copy the current file to `<file>.bad`, returning the copy's path
    ///
    /// `None` when there is no file to keep.
    pub async fn back_up(&self) -> Result<Option<PathBuf>> {
        if fs::metadata(&self.path).await.is_err() {
            return Ok(None);
        }
        let backup = self.sibling(".bad");
        fs::copy(&self.path, &backup).await?;
        Ok(Some(backup))
    }

    /// Rewrite the whole document
    ///
    /// Writes a sibling temp file and renames it over the target, so readers
    /// never observe a half-written document.
    pub async fn save(&self, doc: &ConfigDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = to_pretty_json(doc)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, data.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            detectors = doc.detectors.len(),
            "Config document saved"
        );

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

/// Pretty JSON with 4-space indent, the format the document has always used
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| Error::Internal(format!("non-utf8 json: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConfigRepository::new(dir.path().join("missing.json"));
        assert!(matches!(repo.load().await, Err(Error::ConfigUnreadable(_))));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gl_config.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let repo = ConfigRepository::new(&path);
        assert!(matches!(repo.load().await, Err(Error::ConfigUnreadable(_))));
    }

    #[tokio::test]
    async fn test_non_document_json_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gl_config.json");
        std::fs::write(&path, br#"{"detectors": "none"}"#).unwrap();
        let repo = ConfigRepository::new(&path);
        assert!(matches!(repo.load().await, Err(Error::ConfigUnreadable(_))));
    }

    #[tokio::test]
    async fn test_back_up_copies_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gl_config.json");
        let repo = ConfigRepository::new(&path);
        assert_eq!(repo.back_up().await.unwrap(), None);

        std::fs::write(&path, b"[1, 2").unwrap();
        let backup = repo.back_up().await.unwrap().unwrap();
        assert_eq!(backup, dir.path().join("gl_config.json.bad"));
        assert_eq!(std::fs::read(&backup).unwrap(), b"[1, 2");
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConfigRepository::new(dir.path().join("nested").join("gl_config.json"));
        let doc = ConfigDocument {
            api_key: Some("key".to_string()),
            ..Default::default()
        };

        repo.save(&doc).await.unwrap();
        assert_eq!(repo.load().await.unwrap(), doc);
        // temp file renamed away
        assert!(!dir.path().join("nested").join("gl_config.json.tmp").exists());

        let text = std::fs::read_to_string(repo.path()).unwrap();
        assert!(text.contains("\n    \"api_key\""));
    }
}
