//! WorkerRuntime - the loop run inside one worker process
//!
//! ## Responsibilities
//!
//! - Open the detector's video source and keep it for the process lifetime
//! - Trigger captures on a fixed cycle or on a GPIO edge
//! - Submit every captured frame as an image query
//!
//! Capture and submit errors are logged and the loop carries on. The process
//! only ends when the supervisor kills it.

use crate::config_store::{PinState, TriggerType};
use crate::detector_client::DetectorClient;
use crate::error::{Error, Result};
use crate::video_source::{SourceLease, VideoBackend};
use crate::worker_manager::WorkerSpec;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CYCLE_TIME_SEC: f64 = 30.0;
pub const GPIO_POLL_INTERVAL: Duration = Duration::from_millis(50);
const GPIO_ROOT: &str = "/sys/class/gpio";

/// Fires once per transition of a digital input into its active level
#[derive(Debug, Clone)]
pub struct EdgeTrigger {
    active: PinState,
    last: Option<PinState>,
}

impl EdgeTrigger {
    pub fn new(active: PinState) -> Self {
        Self { active, last: None }
    }

    /// Feed one reading. The first reading only sets the baseline.
    pub fn observe(&mut self, level: PinState) -> bool {
        let fired = matches!(self.last, Some(prev) if prev != self.active) && level == self.active;
        self.last = Some(level);
        fired
    }
}

/// Parse a sysfs GPIO `value` file ("0\n" / "1\n")
fn parse_level(raw: &str) -> Option<PinState> {
    match raw.trim() {
        "0" => Some(PinState::Low),
        "1" => Some(PinState::High),
        _ => None,
    }
}

/// WorkerRuntime instance
pub struct WorkerRuntime {
    spec: WorkerSpec,
    detector_id: String,
    backend: Arc<dyn VideoBackend>,
    client: DetectorClient,
    gpio_root: PathBuf,
}

impl WorkerRuntime {
    pub fn new(spec: WorkerSpec, backend: Arc<dyn VideoBackend>) -> Result<Self> {
        let detector_id = spec
            .detector
            .remote_id()
            .ok_or_else(|| {
                Error::Validation(format!("detector {} has no remote id", spec.detector.name))
            })?
            .to_string();

        match &spec.detector.config.trigger_type {
            TriggerType::DigitalIo if spec.detector.config.pin.is_none() => {
                return Err(Error::Validation(format!(
                    "detector {} uses a digital input trigger but no pin",
                    spec.detector.name
                )));
            }
            TriggerType::Other(kind) => {
                return Err(Error::Validation(format!(
                    "detector {} has unsupported trigger type {:?}",
                    spec.detector.name, kind
                )));
            }
            _ => {}
        }

        let client = DetectorClient::new(&spec.credentials)?;

        Ok(Self {
            spec,
            detector_id,
            backend,
            client,
            gpio_root: PathBuf::from(GPIO_ROOT),
        })
    }

    /// Read GPIO values somewhere other than `/sys/class/gpio`
    pub fn with_gpio_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.gpio_root = root.into();
        self
    }

    pub fn cycle_time(&self) -> Duration {
        let secs = self
            .spec
            .detector
            .config
            .cycle_time_seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(DEFAULT_CYCLE_TIME_SEC);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_CYCLE_TIME_SEC))
    }

    fn gpio_value_path(&self, pin: u32) -> PathBuf {
        self.gpio_root.join(format!("gpio{}", pin)).join("value")
    }

    async fn read_level(&self, pin: u32) -> Result<PinState> {
        let raw = tokio::fs::read_to_string(self.gpio_value_path(pin)).await?;
        parse_level(&raw).ok_or_else(|| {
            Error::Validation(format!("unexpected gpio{} value {:?}", pin, raw.trim()))
        })
    }

    /// Run until the process is killed
    pub async fn run(self) -> Result<()> {
        let source = &self.spec.detector.config.video_source;
        let handle = self.backend.create_source(source).await?;
        let mut lease = SourceLease::new(handle);

        tracing::info!(
            detector = %self.spec.detector.name,
            detector_id = %self.detector_id,
            camera = %source,
            trigger = ?self.spec.detector.config.trigger_type,
            "Worker running"
        );

        match &self.spec.detector.config.trigger_type {
            TriggerType::CycleTime => self.run_cycle(&mut lease).await,
            TriggerType::DigitalIo => self.run_digital_io(&mut lease).await,
            TriggerType::Other(kind) => Err(Error::Validation(format!(
                "unsupported trigger type {:?}",
                kind
            ))),
        }
    }

    async fn run_cycle(&self, lease: &mut SourceLease) -> Result<()> {
        let mut interval = tokio::time::interval(self.cycle_time());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.capture_and_submit(lease).await;
        }
    }

    async fn run_digital_io(&self, lease: &mut SourceLease) -> Result<()> {
        let config = &self.spec.detector.config;
        let pin = config
            .pin
            .ok_or_else(|| Error::Validation("digital input trigger without pin".to_string()))?;
        let mut trigger = EdgeTrigger::new(config.pin_active_state.unwrap_or_default());
        let mut read_failing = false;

        loop {
            match self.read_level(pin).await {
                Ok(level) => {
                    read_failing = false;
                    if trigger.observe(level) {
                        tracing::debug!(pin, level = ?level, "Digital input triggered");
                        self.capture_and_submit(lease).await;
                    }
                }
                Err(e) => {
                    // log once per failure streak, not every poll
                    if !read_failing {
                        tracing::warn!(pin, error = %e, "Failed to read digital input");
                        read_failing = true;
                    }
                }
            }
            tokio::time::sleep(GPIO_POLL_INTERVAL).await;
        }
    }

    async fn capture_and_submit(&self, lease: &mut SourceLease) {
        let jpeg = match lease.capture().await {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::warn!(camera = %lease.config(), error = %e, "Capture failed");
                return;
            }
        };

        match self.client.submit_image_query(&self.detector_id, jpeg).await {
            Ok(query) => {
                let result = query.result.unwrap_or_default();
                tracing::info!(
                    detector = %self.spec.detector.name,
                    image_query_id = %query.id,
                    label = ?result.label,
                    confidence = ?result.confidence,
                    "Image query submitted"
                );
            }
            Err(e) => {
                tracing::warn!(detector = %self.spec.detector.name, error = %e, "Image query failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::{Credentials, VideoSourceConfig};
    use crate::test_support::{detector, FakeBackend};

    fn spec(trigger_type: TriggerType, pin: Option<u32>) -> WorkerSpec {
        let mut detector = detector("door", true, VideoSourceConfig::named("camA"));
        detector.config.trigger_type = trigger_type;
        detector.config.pin = pin;
        WorkerSpec {
            detector,
            credentials: Credentials::default(),
        }
    }

    fn backend() -> Arc<dyn VideoBackend> {
        Arc::new(FakeBackend::new(vec![VideoSourceConfig::named("camA")]))
    }

    #[test]
    fn test_edge_trigger_fires_on_transition_only() {
        use PinState::{High, Low};
        let mut trigger = EdgeTrigger::new(High);
        assert!(!trigger.observe(High)); // baseline
        assert!(!trigger.observe(High));
        assert!(!trigger.observe(Low));
        assert!(trigger.observe(High));
        assert!(!trigger.observe(High));
        assert!(!trigger.observe(Low));
        assert!(trigger.observe(High));
    }

    #[test]
    fn test_edge_trigger_active_low() {
        let mut trigger = EdgeTrigger::new(PinState::Low);
        assert!(!trigger.observe(PinState::High));
        assert!(trigger.observe(PinState::Low));
        assert!(!trigger.observe(PinState::Low));
    }

    #[test]
    fn test_unset_active_state_fires_on_high() {
        let spec = spec(TriggerType::DigitalIo, Some(17));
        let mut trigger =
            EdgeTrigger::new(spec.detector.config.pin_active_state.unwrap_or_default());
        assert!(!trigger.observe(PinState::Low));
        assert!(trigger.observe(PinState::High));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("1\n"), Some(PinState::High));
        assert_eq!(parse_level("0"), Some(PinState::Low));
        assert_eq!(parse_level("2"), None);
        assert_eq!(parse_level("high"), None);
    }

    #[test]
    fn test_unknown_trigger_type_rejected() {
        let spec = spec(TriggerType::Other("motion".to_string()), None);
        assert!(matches!(
            WorkerRuntime::new(spec, backend()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_missing_remote_id_rejected() {
        let mut spec = spec(TriggerType::CycleTime, None);
        spec.detector.remote_id.clear();
        assert!(matches!(
            WorkerRuntime::new(spec, backend()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_digital_io_without_pin_rejected() {
        assert!(WorkerRuntime::new(spec(TriggerType::DigitalIo, None), backend()).is_err());
        assert!(WorkerRuntime::new(spec(TriggerType::DigitalIo, Some(17)), backend()).is_ok());
    }

    #[test]
    fn test_cycle_time() {
        let runtime = WorkerRuntime::new(spec(TriggerType::CycleTime, None), backend()).unwrap();
        assert_eq!(runtime.cycle_time(), Duration::from_secs(30));

        let mut unset = spec(TriggerType::CycleTime, None);
        unset.detector.config.cycle_time_seconds = Some(0.0);
        let runtime = WorkerRuntime::new(unset, backend()).unwrap();
        assert_eq!(runtime.cycle_time(), Duration::from_secs(30));

        let mut fractional = spec(TriggerType::CycleTime, None);
        fractional.detector.config.cycle_time_seconds = Some(2.5);
        let runtime = WorkerRuntime::new(fractional, backend()).unwrap();
        assert_eq!(runtime.cycle_time(), Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn test_read_level_from_gpio_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("gpio17")).unwrap();
        std::fs::write(dir.path().join("gpio17/value"), "1\n").unwrap();

        let runtime = WorkerRuntime::new(spec(TriggerType::DigitalIo, Some(17)), backend())
            .unwrap()
            .with_gpio_root(dir.path());
        assert_eq!(runtime.read_level(17).await.unwrap(), PinState::High);
        assert!(runtime.read_level(18).await.is_err());
    }

    #[tokio::test]
    async fn test_run_fails_for_unknown_source() {
        let runtime = WorkerRuntime::new(
            spec(TriggerType::CycleTime, None),
            Arc::new(FakeBackend::new(Vec::new())),
        )
        .unwrap();
        assert!(matches!(
            runtime.run().await,
            Err(Error::SourceUnavailable(_))
        ));
    }
}
