//! WorkerManager - detector worker lifecycle
//!
//! ## Responsibilities
//!
//! - Start one isolated worker per enabled detector
//! - Forceful, idempotent stop
//! - Own the binding between a worker and the detector it runs
//!
//! There is no modify-in-place: changing a detector means stopping its
//! worker and starting a new one.

mod process;

pub use process::ProcessSpawner;

use crate::config_store::{Credentials, DetectorConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a worker needs to run, handed over at spawn time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub detector: DetectorConfig,
    pub credentials: Credentials,
}

/// A running worker as seen from the supervisor: liveness and kill only
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id while running
    fn pid(&self) -> Option<u32>;

    /// Send the kill without waiting for the exit
    fn start_kill(&mut self) -> Result<()>;

    /// Kill the worker and everything it started, then wait for it to exit.
    /// Terminating an exited worker is not an error.
    async fn terminate(&mut self) -> Result<()>;
}

/// Creates isolated workers
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self, spec: &WorkerSpec) -> Result<Box<dyn WorkerProcess>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owned handle to one live worker, bound to the spec it was started with
pub struct WorkerHandle {
    id: WorkerId,
    spec: WorkerSpec,
    started_at: DateTime<Utc>,
    process: Option<Box<dyn WorkerProcess>>,
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn detector(&self) -> &DetectorConfig {
        &self.spec.detector
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    pub fn is_stopped(&self) -> bool {
        self.process.is_none()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }

    pub fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            worker_id: self.id,
            detector_name: self.spec.detector.name.clone(),
            remote_id: self.spec.detector.remote_id.clone(),
            source: self.spec.detector.config.video_source.to_string(),
            pid: self.pid(),
            started_at: self.started_at,
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("detector", &self.spec.detector.name)
            .field("pid", &self.pid())
            .finish()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            tracing::warn!(
                worker_id = %self.id,
                detector = %self.spec.detector.name,
                "Worker handle dropped while running, killing"
            );
            if let Err(e) = process.start_kill() {
                tracing::error!(worker_id = %self.id, error = %e, "Failed to kill dropped worker");
            }
        }
    }
}

/// Serializable view of a live worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub worker_id: WorkerId,
    pub detector_name: String,
    pub remote_id: String,
    pub source: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// WorkerManager instance
pub struct WorkerManager {
    spawner: Arc<dyn WorkerSpawner>,
}

impl WorkerManager {
    pub fn new(spawner: Arc<dyn WorkerSpawner>) -> Self {
        Self { spawner }
    }

    /// Start a worker for one enabled detector
    pub async fn start_one(
        &self,
        credentials: &Credentials,
        detector: &DetectorConfig,
    ) -> Result<WorkerHandle> {
        if !detector.is_enabled() {
            return Err(Error::Validation(format!(
                "detector {} is disabled",
                detector.name
            )));
        }

        let spec = WorkerSpec {
            detector: detector.clone(),
            credentials: credentials.clone(),
        };

        let process = self
            .spawner
            .spawn(&spec)
            .await
            .map_err(|e| Error::WorkerStartFailed {
                detector: detector.name.clone(),
                message: e.to_string(),
            })?;

        let handle = WorkerHandle {
            id: WorkerId::new(),
            spec,
            started_at: Utc::now(),
            process: Some(process),
        };

        tracing::info!(
            worker_id = %handle.id,
            detector = %detector.name,
            camera = %detector.config.video_source,
            pid = ?handle.pid(),
            "Worker started"
        );

        Ok(handle)
    }

    /// Start workers for every enabled detector, in list order
    ///
    /// Disabled detectors get no worker. A detector whose worker fails to
    /// start is logged and skipped; the rest still start.
    pub async fn start_all(
        &self,
        credentials: &Credentials,
        detectors: &[DetectorConfig],
    ) -> Vec<WorkerHandle> {
        let mut handles = Vec::new();

        for detector in detectors.iter().filter(|d| d.is_enabled()) {
            match self.start_one(credentials, detector).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::error!(detector = %detector.name, error = %e, "Failed to start worker");
                }
            }
        }

        handles
    }

    /// Kill one worker. Stopping a stopped handle is a no-op.
    ///
    /// Returns once the process has exited. On error the handle still counts
    /// as stopped and the process is not retried.
    pub async fn stop(&self, handle: &mut WorkerHandle) -> Result<()> {
        let Some(mut process) = handle.process.take() else {
            return Ok(());
        };

        process.terminate().await?;
        tracing::info!(
            worker_id = %handle.id,
            detector = %handle.spec.detector.name,
            "Worker stopped"
        );
        Ok(())
    }

    /// Kill every worker; one failure does not keep the others running
    pub async fn stop_all(&self, handles: Vec<WorkerHandle>) {
        for mut handle in handles {
            if let Err(e) = self.stop(&mut handle).await {
                tracing::error!(
                    worker_id = %handle.id,
                    detector = %handle.spec.detector.name,
                    error = %e,
                    "Failed to stop worker"
                );
            }
        }
    }
}
