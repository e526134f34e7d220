//! API Routes

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::camera_discovery::CameraDescriptor;
use crate::config_store::{ConfigDocument, VideoSourceConfig};
use crate::detector_client::{DetectorClient, DetectorSummary};
use crate::models::{ApiKeyRequest, DetectorListRequest, NewDetectorRequest, CREATE_FAILED};
use crate::state::AppState;
use crate::worker_manager::WorkerSummary;
use crate::Result;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Config document
        .route("/api/config", get(get_config))
        .route("/api/config-json-pretty", get(get_config_json_pretty))
        .route("/api/config-yaml-pretty", get(get_config_yaml_pretty))
        .route("/api/config/detectors", post(replace_detectors))
        .route("/api/config/api_key", post(set_api_key))
        // Detector service
        .route("/api/detectors", get(list_detectors))
        .route("/api/new-detector", post(create_detector))
        // Cameras
        .route("/api/cameras", get(list_cameras))
        .route("/api/refresh-cameras", get(refresh_cameras))
        .route("/api/refresh-camera", post(refresh_camera))
        // Workers
        .route("/api/workers", get(list_workers))
        .with_state(state)
}

// ========================================
// Config document
// ========================================

async fn get_config(State(state): State<AppState>) -> Json<ConfigDocument> {
    Json(state.config_store.document().await)
}

/// Pretty JSON for display, preview images stripped
async fn get_config_json_pretty(State(state): State<AppState>) -> Result<Json<String>> {
    Ok(Json(state.config_store.pretty_json().await?))
}

async fn get_config_yaml_pretty(State(state): State<AppState>) -> Result<Json<String>> {
    Ok(Json(state.config_store.pretty_yaml().await?))
}

/// Replace the detector list and restart every worker
async fn replace_detectors(
    State(state): State<AppState>,
    Json(req): Json<DetectorListRequest>,
) -> Json<ConfigDocument> {
    tracing::info!(detectors = req.detectors.len(), "Detector list received");
    Json(state.supervisor.replace_detectors(req.detectors).await)
}

async fn set_api_key(
    State(state): State<AppState>,
    Json(req): Json<ApiKeyRequest>,
) -> Result<Json<ConfigDocument>> {
    Ok(Json(state.supervisor.set_api_key(req.api_key).await?))
}

// ========================================
// Detector service
// ========================================

async fn detector_client(state: &AppState) -> Result<DetectorClient> {
    DetectorClient::new(&state.config_store.credentials().await)
}

/// Detectors visible to the stored API key, `[]` on any failure
async fn list_detectors(State(state): State<AppState>) -> Json<Vec<DetectorSummary>> {
    let listed = match detector_client(&state).await {
        Ok(client) => client.list_detectors().await,
        Err(e) => Err(e),
    };

    match listed {
        Ok(detectors) => Json(detectors),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to list detectors");
            Json(Vec::new())
        }
    }
}

/// Create a detector, returning its id or `"Failed"`
async fn create_detector(
    State(state): State<AppState>,
    Json(req): Json<NewDetectorRequest>,
) -> Json<String> {
    let created = match detector_client(&state).await {
        Ok(client) => client.create_detector(&req.name, &req.query).await,
        Err(e) => Err(e),
    };

    match created {
        Ok(id) => Json(id),
        Err(e) => {
            tracing::warn!(name = %req.name, error = %e, "Failed to create detector");
            Json(CREATE_FAILED.to_string())
        }
    }
}

// ========================================
// Cameras
// ========================================

async fn list_cameras(State(state): State<AppState>) -> Json<Vec<CameraDescriptor>> {
    Json(state.supervisor.cameras().await)
}

/// Rediscover every camera (restarts all workers)
async fn refresh_cameras(State(state): State<AppState>) -> Json<Vec<CameraDescriptor>> {
    Json(state.supervisor.refresh_all().await)
}

/// Re-probe one camera, `null` if it is not in the cached list
async fn refresh_camera(
    State(state): State<AppState>,
    Json(source): Json<VideoSourceConfig>,
) -> Json<Option<CameraDescriptor>> {
    Json(state.supervisor.refresh_one(&source).await)
}

// ========================================
// Workers
// ========================================

async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerSummary>> {
    Json(state.supervisor.live_workers().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_discovery::CameraDiscovery;
    use crate::config_store::ConfigStore;
    use crate::state::AppConfig;
    use crate::supervisor::{Supervisor, SupervisorPhase};
    use crate::test_support::{detector, FakeBackend, FakeSpawner};
    use crate::worker_manager::WorkerManager;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn test_state(sources: Vec<VideoSourceConfig>) -> (TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let config_store = Arc::new(ConfigStore::open(dir.path().join("gl_config.json")).await);
        let supervisor = Arc::new(Supervisor::new(
            config_store.clone(),
            CameraDiscovery::new(Arc::new(FakeBackend::new(sources)), Duration::ZERO),
            WorkerManager::new(Arc::new(FakeSpawner::new())),
        ));
        supervisor.bootstrap().await;

        let state = AppState {
            config: AppConfig::default(),
            config_store,
            supervisor,
            ffmpeg_version: None,
            started_at: chrono::Utc::now(),
        };
        (dir, state)
    }

    fn cam(name: &str) -> VideoSourceConfig {
        VideoSourceConfig::named(name)
    }

    #[tokio::test]
    async fn test_router_builds() {
        let (_dir, state) = test_state(Vec::new()).await;
        let _router = create_router(state);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_dir, state) = test_state(vec![cam("camA")]).await;
        let Json(health) = super::super::health_check(State(state)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.cameras, 1);
        assert_eq!(health.workers, 0);
        assert_eq!(health.phase, SupervisorPhase::Idle);
    }

    #[tokio::test]
    async fn test_replace_detectors_then_read_config() {
        let (_dir, state) = test_state(vec![cam("camA")]).await;
        let body = DetectorListRequest {
            detectors: vec![
                detector("d1", true, cam("camA")),
                detector("d2", false, cam("camA")),
            ],
        };

        let Json(doc) = replace_detectors(State(state.clone()), Json(body)).await;
        assert_eq!(doc.detectors.len(), 2);

        let Json(read) = get_config(State(state.clone())).await;
        assert_eq!(read, doc);

        let Json(workers) = list_workers(State(state)).await;
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].detector_name, "d1");
        assert_eq!(workers[0].remote_id, "det_d1");
    }

    #[tokio::test]
    async fn test_set_api_key() {
        let (_dir, state) = test_state(Vec::new()).await;
        let Json(doc) = set_api_key(
            State(state.clone()),
            Json(ApiKeyRequest {
                api_key: "abc".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(doc.api_key.as_deref(), Some("abc"));
        assert_eq!(
            state.config_store.credentials().await.api_key.as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn test_pretty_exports_strip_images() {
        let (_dir, state) = test_state(vec![cam("camA")]).await;
        let mut d1 = detector("d1", true, cam("camA"));
        d1.config.image_preview = "aW1hZ2U=".to_string();
        replace_detectors(
            State(state.clone()),
            Json(DetectorListRequest { detectors: vec![d1] }),
        )
        .await;

        let Json(json) = get_config_json_pretty(State(state.clone())).await.unwrap();
        assert!(json.contains("\"vid_config\""));
        assert!(!json.contains("aW1hZ2U="));
        assert!(json.contains("\n    \"detectors\""));

        let Json(yaml) = get_config_yaml_pretty(State(state)).await.unwrap();
        assert!(yaml.contains("vid_config"));
        assert!(!yaml.contains("aW1hZ2U="));
    }

    #[tokio::test]
    async fn test_detector_service_failures_are_swallowed() {
        // no API key stored: the client fails before any network I/O
        let (_dir, state) = test_state(Vec::new()).await;

        let Json(detectors) = list_detectors(State(state.clone())).await;
        assert!(detectors.is_empty());

        let Json(id) = create_detector(
            State(state),
            Json(NewDetectorRequest {
                name: "door".to_string(),
                query: "Is the door open?".to_string(),
            }),
        )
        .await;
        assert_eq!(id, "Failed");
    }

    #[tokio::test]
    async fn test_camera_endpoints() {
        let (_dir, state) = test_state(vec![cam("camA"), cam("camB")]).await;

        let Json(cached) = list_cameras(State(state.clone())).await;
        assert_eq!(cached.len(), 2);

        let Json(refreshed) = refresh_cameras(State(state.clone())).await;
        assert_eq!(refreshed.len(), 2);
        assert_ne!(refreshed[0].image, cached[0].image);

        let Json(one) = refresh_camera(State(state.clone()), Json(cam("camB"))).await;
        assert_eq!(one.unwrap().config, cam("camB"));

        let Json(missing) = refresh_camera(State(state), Json(cam("ghost"))).await;
        assert!(missing.is_none());
    }
}
