//! Supervisor - worker/camera orchestration
//!
//! ## Responsibilities
//!
//! - Keep the live worker set in step with the config document
//! - Full camera rediscovery (stops every worker while sources are probed)
//! - Targeted refresh of one camera, touching only the workers that use it
//!
//! ## Concurrency
//!
//! Every transition runs under one `tokio::sync::Mutex` (the generation
//! lock). Its queue is FIFO, so concurrent requests run one after another in
//! arrival order. The camera cache sits behind its own `RwLock` and is only
//! written inside a transition, so `cameras()` never waits for a transition
//! to finish. The live worker count is published the same way through an
//! atomic updated when a transition finishes.

use crate::camera_discovery::{CameraDescriptor, CameraDiscovery};
use crate::config_store::{
    ConfigDocument, ConfigStore, DetectorConfig, RuntimeConfig, VideoSourceConfig,
};
use crate::error::Result;
use crate::worker_manager::{WorkerHandle, WorkerManager, WorkerSummary};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Whether a transition is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorPhase {
    Idle,
    Transitioning,
}

/// State owned by the generation lock
#[derive(Default)]
struct Generation {
    /// Config the live workers were started from; `None` until first start
    runtime: Option<RuntimeConfig>,
    live: Vec<WorkerHandle>,
    number: u64,
}

/// Supervisor instance
pub struct Supervisor {
    config_store: Arc<ConfigStore>,
    discovery: CameraDiscovery,
    workers: WorkerManager,
    generation: Mutex<Generation>,
    cameras: RwLock<Vec<CameraDescriptor>>,
    live_count: AtomicUsize,
}

impl Supervisor {
    pub fn new(
        config_store: Arc<ConfigStore>,
        discovery: CameraDiscovery,
        workers: WorkerManager,
    ) -> Self {
        Self {
            config_store,
            discovery,
            workers,
            generation: Mutex::new(Generation::default()),
            cameras: RwLock::new(Vec::new()),
            live_count: AtomicUsize::new(0),
        }
    }

    async fn begin(&self, transition: &'static str) -> MutexGuard<'_, Generation> {
        let guard = self.generation.lock().await;
        tracing::debug!(transition, generation = guard.number, "Transition started");
        guard
    }

    fn finish(&self, transition: &'static str, generation: &Generation, started: Instant) {
        self.live_count.store(generation.live.len(), Ordering::Release);
        tracing::info!(
            transition,
            generation = generation.number,
            live_workers = generation.live.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transition finished"
        );
    }

    /// Stop everything currently live
    async fn stop_live(&self, generation: &mut Generation) {
        let live = std::mem::take(&mut generation.live);
        if !live.is_empty() {
            tracing::info!(count = live.len(), "Stopping live workers");
        }
        self.workers.stop_all(live).await;
    }

    async fn start_workers(&self, runtime: &RuntimeConfig) -> Vec<WorkerHandle> {
        tracing::info!(
            detectors = runtime.detectors.len(),
            enabled = runtime.enabled_detectors().count(),
            "Starting workers"
        );
        self.workers
            .start_all(&runtime.credentials, &runtime.detectors)
            .await
    }

    /// Startup: discover cameras, then start workers for the stored config
    pub async fn bootstrap(&self) {
        let started = Instant::now();
        let mut generation = self.begin("bootstrap").await;

        let cameras = self.discovery.discover_all().await;
        *self.cameras.write().await = cameras;

        let document = self.config_store.document().await;
        let runtime = RuntimeConfig::from(&document);
        generation.live = self.start_workers(&runtime).await;
        generation.runtime = Some(runtime);
        generation.number += 1;

        self.finish("bootstrap", &generation, started);
    }

    /// Replace the detector list and swap every worker
    ///
    /// Old workers are stopped before the new document is persisted and the
    /// new workers are started. Start failures are per-detector; the returned
    /// document is the one now in effect.
    pub async fn replace_detectors(&self, detectors: Vec<DetectorConfig>) -> ConfigDocument {
        let started = Instant::now();
        let mut generation = self.begin("replace_config").await;

        self.stop_live(&mut generation).await;

        let document = match self.config_store.replace_detectors(detectors).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(error = %e, "Failed to persist detector list, running unsaved copy");
                self.config_store.document().await
            }
        };

        let runtime = RuntimeConfig::from(&document);
        generation.live = self.start_workers(&runtime).await;
        generation.runtime = Some(runtime);
        generation.number += 1;

        self.finish("replace_config", &generation, started);
        document
    }

    /// Persist a new API key. Running workers keep the key they started with.
    pub async fn set_api_key(&self, api_key: String) -> Result<ConfigDocument> {
        let _generation = self.begin("set_api_key").await;
        self.config_store.set_api_key(api_key).await
    }

    /// Rediscover every camera and restart workers from the last known config
    pub async fn refresh_all(&self) -> Vec<CameraDescriptor> {
        let started = Instant::now();
        let mut generation = self.begin("refresh_all").await;

        // discovery needs exclusive access to every source
        self.stop_live(&mut generation).await;

        let cameras = self.discovery.discover_all().await;
        *self.cameras.write().await = cameras.clone();

        match generation.runtime.clone() {
            Some(runtime) => {
                generation.live = self.start_workers(&runtime).await;
            }
            None => {
                tracing::warn!("No runtime config known, leaving zero workers");
            }
        }
        generation.number += 1;

        self.finish("refresh_all", &generation, started);
        cameras
    }

    /// Re-probe one cached camera
    ///
    /// Returns `None` without side effects when no cached camera has exactly
    /// this config. Otherwise only the enabled workers watching this camera
    /// are stopped, and they are restarted with their unchanged spec whether
    /// or not the probe succeeded. A failed probe keeps the stale image.
    pub async fn refresh_one(&self, source: &VideoSourceConfig) -> Option<CameraDescriptor> {
        let started = Instant::now();
        let mut generation = self.begin("refresh_one").await;

        let known = self.cameras.read().await.iter().any(|c| c.config == *source);
        if !known {
            tracing::info!(camera = %source, "Refresh requested for unknown camera");
            return None;
        }

        let affected: Vec<usize> = generation
            .live
            .iter()
            .enumerate()
            .filter(|(_, h)| h.detector().is_enabled() && h.detector().uses_source(source))
            .map(|(i, _)| i)
            .collect();

        for &i in &affected {
            let handle = &mut generation.live[i];
            if let Err(e) = self.workers.stop(handle).await {
                tracing::error!(worker_id = %handle.id(), error = %e, "Failed to stop worker");
            }
        }

        let probed = self.discovery.probe_one(source).await;

        let updated = {
            let mut cameras = self.cameras.write().await;
            cameras.iter_mut().find(|c| c.config == *source).map(|camera| {
                match probed {
                    Ok(fresh) => camera.image = fresh.image,
                    Err(e) => {
                        tracing::warn!(camera = %source, error = %e, "Probe failed, keeping stale image");
                    }
                }
                camera.clone()
            })
        };

        for i in affected {
            let spec = generation.live[i].spec().clone();
            match self.workers.start_one(&spec.credentials, &spec.detector).await {
                Ok(handle) => generation.live[i] = handle,
                Err(e) => {
                    tracing::error!(detector = %spec.detector.name, error = %e, "Failed to restart worker");
                }
            }
        }
        generation.live.retain(|h| !h.is_stopped());

        self.finish("refresh_one", &generation, started);
        updated
    }

    /// Stop every worker (process shutdown)
    pub async fn shutdown(&self) {
        let mut generation = self.begin("shutdown").await;
        self.stop_live(&mut generation).await;
        self.live_count.store(0, Ordering::Release);
        tracing::info!("Supervisor shut down");
    }

    /// Cached camera list
    pub async fn cameras(&self) -> Vec<CameraDescriptor> {
        self.cameras.read().await.clone()
    }

    pub async fn camera_count(&self) -> usize {
        self.cameras.read().await.len()
    }

    /// Live workers (waits for a running transition)
    pub async fn live_workers(&self) -> Vec<WorkerSummary> {
        self.generation
            .lock()
            .await
            .live
            .iter()
            .map(WorkerHandle::summary)
            .collect()
    }

    /// Number of live workers as of the last finished transition
    ///
    /// Never waits, so it is safe for health checks during a long transition.
    pub fn live_worker_count(&self) -> usize {
        self.live_count.load(Ordering::Acquire)
    }

    pub async fn runtime_config(&self) -> Option<RuntimeConfig> {
        self.generation.lock().await.runtime.clone()
    }

    pub fn phase(&self) -> SupervisorPhase {
        match self.generation.try_lock() {
            Ok(_) => SupervisorPhase::Idle,
            Err(_) => SupervisorPhase::Transitioning,
        }
    }
}
