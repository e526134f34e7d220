//! ConfigStore data types
//!
//! Persisted document layout and the runtime view derived from it

use super::source_config::VideoSourceConfig;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a worker decides when to capture (`"time"` / `"pin"` on the wire)
///
/// Strings this version does not know are kept as `Other` so the document
/// is written back unchanged; such detectors cannot run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TriggerType {
    /// Capture every `cycle_time` seconds
    #[default]
    CycleTime,
    /// Capture when a GPIO pin enters its active state
    DigitalIo,
    Other(String),
}

impl TriggerType {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::CycleTime => "time",
            TriggerType::DigitalIo => "pin",
            TriggerType::Other(s) => s,
        }
    }
}

impl From<&str> for TriggerType {
    fn from(raw: &str) -> Self {
        match raw {
            "time" | "cycle_time" | "cycle-time" => TriggerType::CycleTime,
            "pin" | "digital_io" | "digital-io" => TriggerType::DigitalIo,
            other => TriggerType::Other(other.to_string()),
        }
    }
}

impl Serialize for TriggerType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TriggerType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TriggerType::from(raw.as_str()))
    }
}

/// Level of a digital input (`0` / `1` on the wire)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PinState {
    Low = 0,
    #[default]
    High = 1,
}

impl TryFrom<u8> for PinState {
    type Error = u8;

    fn try_from(level: u8) -> Result<Self, u8> {
        match level {
            0 => Ok(PinState::Low),
            1 => Ok(PinState::High),
            other => Err(other),
        }
    }
}

impl Serialize for PinState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for PinState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let level = u8::deserialize(deserializer)?;
        PinState::try_from(level)
            .map_err(|v| de::Error::custom(format!("pin state must be 0 or 1, got {}", v)))
    }
}

/// Optional field that never fails the document
///
/// A value of the wrong shape is logged and read as absent, so one bad
/// field does not make the whole config unreadable.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            tracing::warn!(value = %value, error = %e, "Ignoring invalid config value");
            Ok(None)
        }
    }
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// Seconds are written back as integers when they are whole
fn serialize_seconds<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(secs) if secs.fract() == 0.0 && secs.abs() < 9.0e15 => {
            serializer.serialize_some(&(*secs as i64))
        }
        Some(secs) => serializer.serialize_some(secs),
        None => serializer.serialize_none(),
    }
}

/// Per-detector runtime settings (`config` on the wire)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorSettings {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub enabled: bool,
    #[serde(rename = "vid_config", default)]
    pub video_source: VideoSourceConfig,
    /// Base64 JPEG preview, may be empty
    #[serde(rename = "image", default, deserialize_with = "lenient_or_default")]
    pub image_preview: String,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub trigger_type: TriggerType,
    #[serde(
        rename = "cycle_time",
        default,
        deserialize_with = "lenient",
        serialize_with = "serialize_seconds"
    )]
    pub cycle_time_seconds: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub pin: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub pin_active_state: Option<PinState>,
}

/// One entry of the persisted detector list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub name: String,
    /// Id assigned by the detector service; empty until created
    #[serde(rename = "id", default)]
    pub remote_id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub config: DetectorSettings,
}

impl DetectorConfig {
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether this detector watches exactly `source`
    pub fn uses_source(&self, source: &VideoSourceConfig) -> bool {
        self.config.video_source == *source
    }

    pub fn remote_id(&self) -> Option<&str> {
        if self.remote_id.is_empty() {
            None
        } else {
            Some(&self.remote_id)
        }
    }
}

/// Detector service credentials
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Persisted config document (`gl_config.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub detectors: Vec<DetectorConfig>,
}

impl ConfigDocument {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_key: self.api_key.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    /// JSON view with every detector's preview image removed
    pub fn without_previews(&self) -> crate::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(detectors) = value.get_mut("detectors").and_then(|d| d.as_array_mut()) {
            for detector in detectors {
                if let Some(config) = detector.get_mut("config").and_then(|c| c.as_object_mut()) {
                    config.remove("image");
                }
            }
        }
        Ok(value)
    }
}

/// Runtime view of a config document: what the live workers were started from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeConfig {
    pub credentials: Credentials,
    pub detectors: Vec<DetectorConfig>,
}

impl RuntimeConfig {
    pub fn enabled_detectors(&self) -> impl Iterator<Item = &DetectorConfig> {
        self.detectors.iter().filter(|d| d.is_enabled())
    }
}

impl From<&ConfigDocument> for RuntimeConfig {
    fn from(doc: &ConfigDocument) -> Self {
        Self {
            credentials: doc.credentials(),
            detectors: doc.detectors.clone(),
        }
    }
}
