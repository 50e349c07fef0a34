//! Integration tests for the exporter API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use exporter_lib::{
    api::{create_router, AppState},
    fetcher::async_trait,
    health::{components, HealthRegistry},
    observability::{ExporterMetrics, StructuredLogger},
    ClusterStateFetcher, FetchError, Scraper, Service, ServiceMode, Task, SWARM_SCHEMA,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// In-memory swarm whose docker connection can be switched off
struct FakeSwarm {
    services: Vec<Service>,
    tasks: Vec<Task>,
    unreachable: AtomicBool,
}

#[async_trait]
impl ClusterStateFetcher for FakeSwarm {
    async fn list_services(&self) -> Result<Vec<Service>, FetchError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(FetchError::Transport(
                "/var/run/docker.sock: connection refused".to_string(),
            ));
        }
        Ok(self.services.clone())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, FetchError> {
        Ok(self.tasks.clone())
    }
}

fn task(id: &str, service_id: &str, state: &str, secs: i64) -> Task {
    Task {
        id: id.to_string(),
        service_id: service_id.to_string(),
        state: state.to_string(),
        state_timestamp: Some(Utc.timestamp_opt(secs, 0).unwrap()),
    }
}

fn fake_swarm() -> Arc<FakeSwarm> {
    Arc::new(FakeSwarm {
        services: vec![
            Service {
                id: "svc-web".to_string(),
                name: "web".to_string(),
                mode: ServiceMode::Replicated { desired_replicas: 3 },
                image: "nginx:1".to_string(),
            },
            Service {
                id: "svc-worker".to_string(),
                name: "worker".to_string(),
                mode: ServiceMode::Replicated { desired_replicas: 2 },
                image: "worker:7".to_string(),
            },
            Service {
                id: "svc-node-agent".to_string(),
                name: "node-agent".to_string(),
                mode: ServiceMode::Global,
                image: "agent:1".to_string(),
            },
        ],
        tasks: vec![
            task("t1", "svc-web", "running", 100),
            task("t2", "svc-web", "running", 150),
            task("t3", "svc-node-agent", "running", 80),
            task("t4", "svc-node-agent", "failed", 90),
            task("t5", "ghost", "failed", 999),
        ],
        unreachable: AtomicBool::new(false),
    })
}

async fn setup_test_app() -> (Router, Arc<AppState>, Arc<FakeSwarm>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::DOCKER).await;
    health_registry.register(components::SCRAPER).await;

    let metrics = ExporterMetrics::new().unwrap();
    metrics.set_build_info("0.1.0");

    let swarm = fake_swarm();
    let scraper = Scraper::new(
        swarm.clone(),
        &SWARM_SCHEMA,
        metrics.clone(),
        StructuredLogger::new("test"),
    );
    let state = Arc::new(AppState::new(scraper, health_registry, metrics));
    let router = create_router(state.clone());

    (router, state, swarm)
}

async fn get(app: Router, uri: &str) -> (StatusCode, String, Option<String>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, String::from_utf8(body.to_vec()).unwrap(), content_type)
}

#[tokio::test]
async fn test_metrics_endpoint_returns_swarm_metrics() {
    let (app, _state, _swarm) = setup_test_app().await;

    let (status, body, content_type) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().contains("text/plain"));

    assert!(body.contains("# TYPE swarm_service_desired_replicas gauge"));
    assert!(body.contains("swarm_service_desired_replicas{service_name=\"web\"} 3"));
    assert!(body.contains("swarm_service_tasks{service_name=\"web\",state=\"running\"} 2"));
    assert!(body.contains("swarm_service_change_time{service_name=\"web\"} 150"));
    assert!(body.contains("swarm_service_tasks{service_name=\"node-agent\",state=\"failed\"} 1"));
    assert!(body.contains("# HELP swarm_service_info Information about each service"));
}

#[tokio::test]
async fn test_service_without_tasks_reports_zero() {
    let (app, _state, _swarm) = setup_test_app().await;

    let (_, body, _) = get(app, "/metrics").await;

    assert!(body.contains("swarm_service_desired_replicas{service_name=\"worker\"} 2"));
    assert!(body.contains("swarm_service_tasks{service_name=\"worker\",state=\"running\"} 0"));
    assert!(body.contains("swarm_service_change_time{service_name=\"worker\"} 0"));
}

#[tokio::test]
async fn test_global_service_has_no_desired_replicas() {
    let (app, _state, _swarm) = setup_test_app().await;

    let (_, body, _) = get(app, "/metrics").await;

    assert!(!body.contains("swarm_service_desired_replicas{service_name=\"node-agent\"}"));
    assert!(body.contains("swarm_service_tasks{service_name=\"node-agent\",state=\"running\"} 1"));
}

#[tokio::test]
async fn test_orphan_tasks_are_not_exported() {
    let (app, _state, _swarm) = setup_test_app().await;

    let (_, body, _) = get(app, "/metrics").await;

    assert!(!body.contains("ghost"));
    assert!(body.contains("swarm_exporter_orphaned_tasks 1"));
}

#[tokio::test]
async fn test_metrics_include_exporter_self_metrics() {
    let (app, _state, _swarm) = setup_test_app().await;

    let (_, body, _) = get(app, "/metrics").await;

    assert!(body.contains("swarm_exporter_scrape_duration_seconds_bucket"));
    assert!(body.contains("swarm_exporter_services 3"));
    assert!(body.contains("swarm_exporter_build_info{version=\"0.1.0\"} 1"));
}

#[tokio::test]
async fn test_fetch_failure_returns_500_then_recovers() {
    let (app, state, swarm) = setup_test_app().await;

    swarm.unreachable.store(true, Ordering::SeqCst);
    let (status, body, _) = get(app.clone(), "/metrics").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("scrape failed"));
    assert!(!body.contains("swarm_service_"));

    let health = state.health_registry.health().await;
    assert_eq!(health.components[components::DOCKER].consecutive_failures, 1);

    swarm.unreachable.store(false, Ordering::SeqCst);
    let (status, body, _) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("swarm_service_tasks{service_name=\"web\",state=\"running\"} 2"));
    assert!(body.contains("swarm_exporter_scrape_errors_total{stage=\"fetch\"} 1"));
}

#[tokio::test]
async fn test_healthz_degraded_after_fetch_failure() {
    let (app, _state, swarm) = setup_test_app().await;

    swarm.unreachable.store(true, Ordering::SeqCst);
    let _ = get(app.clone(), "/metrics").await;

    let (status, body, _) = get(app, "/healthz").await;
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();

    // Degraded still returns 200 (the exporter keeps serving)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["docker"]["status"], "degraded");
    assert!(health["components"]["docker"]["message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn test_healthz_includes_component_details() {
    let (app, _state, _swarm) = setup_test_app().await;

    let (status, body, _) = get(app, "/healthz").await;
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["docker"].is_object());
    assert!(health["components"]["scraper"].is_object());
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state, _swarm) = setup_test_app().await;

    let (status, body, _) = get(app, "/readyz").await;
    let readiness: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state, _swarm) = setup_test_app().await;

    state.health_registry.set_ready(true).await;

    let (status, body, _) = get(app, "/readyz").await;
    let readiness: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_fails_after_repeated_fetch_failures() {
    let (app, state, swarm) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    swarm.unreachable.store(true, Ordering::SeqCst);
    for _ in 0..3 {
        let (status, _, _) = get(app.clone(), "/metrics").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    let (status, body, _) = get(app.clone(), "/readyz").await;
    let readiness: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["reason"], "docker failed 3 scrapes in a row");

    // Liveness is unaffected
    let (status, _, _) = get(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    swarm.unreachable.store(false, Ordering::SeqCst);
    let (status, _, _) = get(app.clone(), "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
}
