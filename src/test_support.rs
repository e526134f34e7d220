//! In-memory backends for unit tests

use crate::config_store::{
    DetectorConfig, DetectorSettings, TriggerType, VideoSourceConfig,
};
use crate::error::{Error, Result};
use crate::video_source::{SourceHandle, VideoBackend};
use crate::worker_manager::{WorkerProcess, WorkerSpawner, WorkerSpec};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub fn detector(name: &str, enabled: bool, source: VideoSourceConfig) -> DetectorConfig {
    DetectorConfig {
        name: name.to_string(),
        remote_id: format!("det_{}", name),
        query: format!("Is {} ok?", name),
        config: DetectorSettings {
            enabled,
            video_source: source,
            image_preview: String::new(),
            trigger_type: TriggerType::CycleTime,
            cycle_time_seconds: Some(30.0),
            pin: None,
            pin_active_state: None,
        },
    }
}

/// Video backend over a fixed list of sources
///
/// Captures return `"<name>#<n>"` where `n` counts captures per backend, so a
/// re-probe always yields a different image.
#[derive(Clone, Default)]
pub struct FakeBackend {
    sources: Arc<Mutex<Vec<VideoSourceConfig>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    captures: Arc<AtomicU32>,
    opened: Arc<Mutex<Vec<String>>>,
    released: Arc<Mutex<Vec<String>>>,
}

impl FakeBackend {
    pub fn new(sources: Vec<VideoSourceConfig>) -> Self {
        Self {
            sources: Arc::new(Mutex::new(sources)),
            ..Default::default()
        }
    }

    pub fn set_sources(&self, sources: Vec<VideoSourceConfig>) {
        *self.sources.lock().unwrap() = sources;
    }

    /// Make captures of the source with this name fail
    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    fn open(&self, config: VideoSourceConfig) -> Box<dyn SourceHandle> {
        let name = config.name().unwrap_or_default().to_string();
        self.opened.lock().unwrap().push(name.clone());
        Box::new(FakeSource {
            fail: self.failing.lock().unwrap().contains(&name),
            name,
            config,
            backend: self.clone(),
        })
    }
}

#[async_trait]
impl VideoBackend for FakeBackend {
    async fn autodiscover(&self) -> Result<Vec<Box<dyn SourceHandle>>> {
        let sources = self.sources.lock().unwrap().clone();
        Ok(sources.into_iter().map(|c| self.open(c)).collect())
    }

    async fn create_source(&self, config: &VideoSourceConfig) -> Result<Box<dyn SourceHandle>> {
        let known = self.sources.lock().unwrap().contains(config);
        if !known {
            return Err(Error::SourceUnavailable(config.to_string()));
        }
        Ok(self.open(config.clone()))
    }
}

struct FakeSource {
    name: String,
    config: VideoSourceConfig,
    fail: bool,
    backend: FakeBackend,
}

#[async_trait]
impl SourceHandle for FakeSource {
    fn config(&self) -> &VideoSourceConfig {
        &self.config
    }

    async fn capture(&mut self) -> Result<Vec<u8>> {
        if self.fail {
            return Err(Error::SourceUnavailable(self.name.clone()));
        }
        let n = self.backend.captures.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}#{}", self.name, n).into_bytes())
    }

    fn release(&mut self) {
        self.backend.released.lock().unwrap().push(self.name.clone());
    }
}

/// Spawner that records starts and kills instead of creating processes
#[derive(Clone, Default)]
pub struct FakeSpawner {
    next_pid: Arc<AtomicU32>,
    started: Arc<Mutex<Vec<String>>>,
    killed: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    failing_stops: Arc<Mutex<HashSet<String>>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make spawning the detector with this name fail
    pub fn fail(&self, detector: &str) {
        self.failing.lock().unwrap().insert(detector.to_string());
    }

    /// Make stopping workers of the detector with this name fail
    ///
    /// A failed stop records no kill.
    pub fn fail_stop(&self, detector: &str) {
        self.failing_stops.lock().unwrap().insert(detector.to_string());
    }

    /// Detector names in spawn order
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Detector names in kill order
    pub fn killed(&self) -> Vec<String> {
        self.killed.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.started.lock().unwrap().clear();
        self.killed.lock().unwrap().clear();
    }
}

#[async_trait]
impl WorkerSpawner for FakeSpawner {
    async fn spawn(&self, spec: &WorkerSpec) -> Result<Box<dyn WorkerProcess>> {
        let name = spec.detector.name.clone();
        if self.failing.lock().unwrap().contains(&name) {
            return Err(Error::Internal(format!("spawn refused for {}", name)));
        }
        self.started.lock().unwrap().push(name.clone());
        Ok(Box::new(FakeProcess {
            pid: 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
            name,
            alive: true,
            killed: self.killed.clone(),
            failing_stops: self.failing_stops.clone(),
        }))
    }
}

struct FakeProcess {
    pid: u32,
    name: String,
    alive: bool,
    killed: Arc<Mutex<Vec<String>>>,
    failing_stops: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl WorkerProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        self.alive.then_some(self.pid)
    }

    fn start_kill(&mut self) -> Result<()> {
        if self.failing_stops.lock().unwrap().contains(&self.name) {
            return Err(Error::Internal(format!("kill refused for {}", self.name)));
        }
        if self.alive {
            self.alive = false;
            self.killed.lock().unwrap().push(self.name.clone());
        }
        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        self.start_kill()
    }
}
