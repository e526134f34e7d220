//! ffmpeg-backed sources
//!
//! - Local webcams: V4L2 device nodes `/dev/video<idx>`
//! - Network cameras: RTSP URLs listed in configuration
//!
//! A capture spawns one short-lived ffmpeg process that writes a single MJPEG
//! frame to stdout. The child is `kill_on_drop`, so a timeout or a cancelled
//! request kills it instead of leaving it attached to the device.

use super::{SourceHandle, VideoBackend};
use crate::config_store::VideoSourceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default per-capture timeout in seconds
pub const DEFAULT_CAPTURE_TIMEOUT_SEC: u64 = 10;

/// Backend enumerating V4L2 webcams plus configured RTSP streams
pub struct FfmpegBackend {
    device_dir: PathBuf,
    rtsp_urls: Vec<String>,
    capture_timeout: Duration,
}

impl FfmpegBackend {
    pub fn new(rtsp_urls: Vec<String>, capture_timeout: Duration) -> Self {
        Self {
            device_dir: PathBuf::from("/dev"),
            rtsp_urls,
            capture_timeout,
        }
    }

    /// Look for device nodes somewhere other than `/dev`
    pub fn with_device_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.device_dir = dir.into();
        self
    }

    /// Indices of `video<N>` nodes in the device directory, ascending
    async fn list_video_devices(&self) -> Result<Vec<i64>> {
        let mut entries = tokio::fs::read_dir(&self.device_dir).await?;
        let mut indices = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(idx) = parse_video_index(&name.to_string_lossy()) {
                indices.push(idx);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    fn device_path(&self, idx: i64) -> PathBuf {
        self.device_dir.join(format!("video{}", idx))
    }

    fn open(&self, config: VideoSourceConfig, input: FfmpegInput) -> Box<dyn SourceHandle> {
        Box::new(FfmpegSource {
            config,
            input,
            timeout: self.capture_timeout,
            released: false,
        })
    }
}

#[async_trait]
impl VideoBackend for FfmpegBackend {
    async fn autodiscover(&self) -> Result<Vec<Box<dyn SourceHandle>>> {
        let mut sources = Vec::new();

        match self.list_video_devices().await {
            Ok(indices) => {
                for idx in indices {
                    let config = VideoSourceConfig::webcam(&format!("webcam{}", idx), idx);
                    sources.push(self.open(config, FfmpegInput::Device(self.device_path(idx))));
                }
            }
            Err(e) => {
                tracing::warn!(
                    device_dir = %self.device_dir.display(),
                    error = %e,
                    "Failed to enumerate video devices"
                );
            }
        }

        for (n, url) in self.rtsp_urls.iter().enumerate() {
            let config = VideoSourceConfig::rtsp(&format!("rtsp{}", n), url);
            sources.push(self.open(config, FfmpegInput::Rtsp(url.clone())));
        }

        tracing::debug!(count = sources.len(), "Video sources enumerated");
        Ok(sources)
    }

    async fn create_source(&self, config: &VideoSourceConfig) -> Result<Box<dyn SourceHandle>> {
        let input = match config.input_type() {
            Some(VideoSourceConfig::INPUT_WEBCAM) => {
                let idx = config.index().ok_or_else(|| {
                    Error::SourceUnavailable(format!("{}: webcam without idx", config))
                })?;
                let path = self.device_path(idx);
                if tokio::fs::metadata(&path).await.is_err() {
                    return Err(Error::SourceUnavailable(format!(
                        "{}: {} not present",
                        config,
                        path.display()
                    )));
                }
                FfmpegInput::Device(path)
            }
            Some(VideoSourceConfig::INPUT_RTSP) => {
                let url = config.rtsp_url().ok_or_else(|| {
                    Error::SourceUnavailable(format!("{}: rtsp without rtsp_url", config))
                })?;
                FfmpegInput::Rtsp(url.to_string())
            }
            other => {
                return Err(Error::SourceUnavailable(format!(
                    "{}: unsupported input_type {:?}",
                    config, other
                )))
            }
        };

        Ok(self.open(config.clone(), input))
    }
}

/// `video12` -> 12
fn parse_video_index(name: &str) -> Option<i64> {
    name.strip_prefix("video")?.parse().ok()
}

#[derive(Debug, Clone)]
enum FfmpegInput {
    Device(PathBuf),
    Rtsp(String),
}

impl FfmpegInput {
    fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = match self {
            FfmpegInput::Device(path) => vec![
                "-f".into(),
                "v4l2".into(),
                "-i".into(),
                path.display().to_string(),
            ],
            FfmpegInput::Rtsp(url) => vec![
                "-rtsp_transport".into(),
                "tcp".into(),
                "-i".into(),
                url.clone(),
            ],
        };
        args.extend(
            [
                "-frames:v",
                "1",
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-loglevel",
                "error",
                "-y",
                "-",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

struct FfmpegSource {
    config: VideoSourceConfig,
    input: FfmpegInput,
    timeout: Duration,
    released: bool,
}

#[async_trait]
impl SourceHandle for FfmpegSource {
    fn config(&self) -> &VideoSourceConfig {
        &self.config
    }

    async fn capture(&mut self) -> Result<Vec<u8>> {
        if self.released {
            return Err(Error::SourceUnavailable(format!("{} released", self.config)));
        }
        run_ffmpeg(&self.input.args(), self.timeout)
            .await
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", self.config, e)))
    }

    fn release(&mut self) {
        self.released = true;
    }
}

async fn run_ffmpeg(args: &[String], timeout: Duration) -> Result<Vec<u8>> {
    let child = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Internal(format!("ffmpeg spawn failed: {}", e)))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(Error::Internal(format!("ffmpeg failed: {}", stderr.trim())));
            }
            if output.stdout.is_empty() {
                return Err(Error::Internal("ffmpeg returned empty output".to_string()));
            }
            Ok(output.stdout)
        }
        Ok(Err(e)) => Err(Error::Internal(format!("ffmpeg execution failed: {}", e))),
        Err(_) => {
            // child dropped with the future, kill_on_drop sends SIGKILL
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "ffmpeg capture timed out");
            Err(Error::Internal(format!("ffmpeg timeout ({:?})", timeout)))
        }
    }
}

/// Check ffmpeg is on PATH, returning its version line
pub async fn ffmpeg_version() -> Result<String> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
        .map_err(|e| Error::Internal(format!("ffmpeg not found: {}", e)))?;

    if !output.status.success() {
        return Err(Error::Internal("ffmpeg version check failed".to_string()));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    Ok(version.lines().next().unwrap_or("unknown").to_string())
}
