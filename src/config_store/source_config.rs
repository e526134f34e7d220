//! Video source configuration value
//!
//! A camera is identified by its source configuration, and the same value is
//! stored on every detector that watches it. Matching a detector to a camera
//! is plain equality on this type, so equality has to survive a round trip
//! through the frontend and the config file: key order never matters and
//! integral numbers compare equal regardless of whether they came back as
//! `1` or `1.0`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field value inside a [`VideoSourceConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<SourceValue>),
    Map(BTreeMap<String, SourceValue>),
}

impl PartialEq for SourceValue {
    fn eq(&self, other: &Self) -> bool {
        use SourceValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(i), Float(f)) | (Float(f), Int(i)) => f.fract() == 0.0 && *f == *i as f64,
            (Text(a), Text(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            _ => false,
        }
    }
}

impl SourceValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SourceValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SourceValue::Int(i) => Some(*i),
            SourceValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }
}

impl From<&str> for SourceValue {
    fn from(v: &str) -> Self {
        SourceValue::Text(v.to_string())
    }
}

impl From<String> for SourceValue {
    fn from(v: String) -> Self {
        SourceValue::Text(v)
    }
}

impl From<i64> for SourceValue {
    fn from(v: i64) -> Self {
        SourceValue::Int(v)
    }
}

impl From<bool> for SourceValue {
    fn from(v: bool) -> Self {
        SourceValue::Bool(v)
    }
}

/// Structural source configuration (`vid_config` on the wire)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoSourceConfig(BTreeMap<String, SourceValue>);

impl VideoSourceConfig {
    pub const INPUT_WEBCAM: &'static str = "webcam";
    pub const INPUT_RTSP: &'static str = "rtsp";

    pub fn new() -> Self {
        Self::default()
    }

    /// Config carrying only a display name
    pub fn named(name: &str) -> Self {
        Self::new().with("name", name)
    }

    /// Local V4L2 webcam by device index
    pub fn webcam(name: &str, idx: i64) -> Self {
        Self::named(name)
            .with("input_type", Self::INPUT_WEBCAM)
            .with("idx", idx)
    }

    /// Network camera by RTSP URL
    pub fn rtsp(name: &str, url: &str) -> Self {
        Self::named(name)
            .with("input_type", Self::INPUT_RTSP)
            .with("rtsp_url", url)
    }

    pub fn with(mut self, key: &str, value: impl Into<SourceValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&SourceValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(SourceValue::as_str)
    }

    pub fn input_type(&self) -> Option<&str> {
        self.get("input_type").and_then(SourceValue::as_str)
    }

    /// Device index (`idx`)
    pub fn index(&self) -> Option<i64> {
        self.get("idx").and_then(SourceValue::as_i64)
    }

    /// Serial number, which the frontend may send as a string or a number
    pub fn serial_number(&self) -> Option<String> {
        match self.get("serial_number")? {
            SourceValue::Text(s) => Some(s.clone()),
            SourceValue::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    pub fn rtsp_url(&self) -> Option<&str> {
        self.get("rtsp_url").and_then(SourceValue::as_str)
    }
}

impl fmt::Display for VideoSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name(), self.input_type()) {
            (Some(name), Some(input)) => write!(f, "{} ({})", name, input),
            (Some(name), None) => write!(f, "{}", name),
            _ => match serde_json::to_string(self) {
                Ok(s) => write!(f, "{}", s),
                Err(_) => write!(f, "<source>"),
            },
        }
    }
}
