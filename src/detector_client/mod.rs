//! DetectorClient - detector service adapter
//!
//! ## Responsibilities
//!
//! - List and create detectors
//! - Submit captured frames as image queries (used by workers)
//!
//! Every failure is reported as `Error::DetectorService`; the web layer turns
//! those into empty lists or failure markers.

use crate::config_store::Credentials;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Used when the config document has no `endpoint`
pub const DEFAULT_ENDPOINT: &str = "https://api.groundlight.ai/device-api";

const API_TOKEN_HEADER: &str = "x-api-token";
const PAGE_SIZE: u32 = 100;
const MAX_PAGES: u32 = 50;

/// Detector as returned by the service
///
/// Fields this crate does not use are kept in `extra` so the listing is passed
/// through to the frontend unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSummary {
    pub id: String,
    pub name: String,
    pub query: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub detector_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DetectorPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<DetectorSummary>,
}

#[derive(Debug, Serialize)]
struct CreateDetectorBody<'a> {
    name: &'a str,
    query: &'a str,
}

/// Answer to a submitted frame
#[derive(Debug, Clone, Deserialize)]
pub struct ImageQuery {
    pub id: String,
    #[serde(default)]
    pub result: Option<ImageQueryResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageQueryResult {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// DetectorClient instance
pub struct DetectorClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl DetectorClient {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::DetectorService(format!("client build failed: {}", e)))?;

        let base_url = credentials
            .endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            api_key: credentials.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::DetectorService("no API key configured".to_string()))
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::DetectorService(format!(
            "HTTP {}: {}",
            status,
            body.trim()
        )))
    }

    /// Every detector visible to the API key
    pub async fn list_detectors(&self) -> Result<Vec<DetectorSummary>> {
        let api_key = self.api_key()?;
        let mut detectors = Vec::new();

        for page in 1..=MAX_PAGES {
            let resp = self
                .client
                .get(self.url("/v1/detectors"))
                .header(API_TOKEN_HEADER, api_key)
                .query(&[("page", page), ("page_size", PAGE_SIZE)])
                .send()
                .await
                .map_err(|e| Error::DetectorService(e.to_string()))?;

            let page: DetectorPage = Self::check(resp)
                .await?
                .json()
                .await
                .map_err(|e| Error::DetectorService(format!("bad detector list: {}", e)))?;

            detectors.extend(page.results);
            if page.next.is_none() {
                break;
            }
        }

        tracing::debug!(count = detectors.len(), "Detectors listed");
        Ok(detectors)
    }

    /// Create a detector, returning its id
    pub async fn create_detector(&self, name: &str, query: &str) -> Result<String> {
        let api_key = self.api_key()?;

        let resp = self
            .client
            .post(self.url("/v1/detectors"))
            .header(API_TOKEN_HEADER, api_key)
            .json(&CreateDetectorBody { name, query })
            .send()
            .await
            .map_err(|e| Error::DetectorService(e.to_string()))?;

        let created: DetectorSummary = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::DetectorService(format!("bad create response: {}", e)))?;

        tracing::info!(detector_id = %created.id, name = %name, "Detector created");
        Ok(created.id)
    }

    /// Submit one JPEG frame to a detector
    pub async fn submit_image_query(&self, detector_id: &str, jpeg: Vec<u8>) -> Result<ImageQuery> {
        let api_key = self.api_key()?;

        let resp = self
            .client
            .post(self.url("/v1/image-queries"))
            .header(API_TOKEN_HEADER, api_key)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .query(&[("detector_id", detector_id)])
            .body(jpeg)
            .send()
            .await
            .map_err(|e| Error::DetectorService(e.to_string()))?;

        Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::DetectorService(format!("bad image query response: {}", e)))
    }
}
