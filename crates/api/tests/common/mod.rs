#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uplink_api::auth::jwt::{generate_access_token, JwtConfig};
use uplink_api::config::{ServerConfig, WsConfig};
use uplink_api::notifications::NotificationRouter;
use uplink_api::router::build_app_router;
use uplink_api::state::AppState;
use uplink_api::ws::WsManager;
use uplink_core::retry::RetryPolicy;
use uplink_core::steps::StepDefinition;
use uplink_core::types::UserId;
use uplink_events::{EventBus, EventPublisher};
use uplink_worker::{MemoryAuditSink, Orchestrator, WorkerConfig, WorkerPool, WorkflowPlan};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        event_bus_capacity: 1024,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
        ws: WsConfig {
            send_buffer: 64,
            heartbeat_interval_secs: 30,
            idle_timeout_secs: 90,
        },
        worker: WorkerConfig {
            concurrency: 4,
            step_timeout_secs: 5,
            step_max_attempts: 1,
            step_backoff_ms: 0,
            dry_run_step_delay_ms: 1,
        },
    }
}

/// Everything a test needs to drive the app and observe its side effects.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub audit: Arc<MemoryAuditSink>,
}

/// Build the full application router with a dry-run upload plan and a
/// running notification router.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let plan = WorkflowPlan::dry_run(
        Arc::new(StepDefinition::oracle_upload()),
        config.worker.dry_run_step_delay(),
    );
    build_test_app_with_plan(config, plan)
}

pub fn build_test_app_with_plan(config: ServerConfig, plan: WorkflowPlan) -> TestApp {
    let ws_manager = Arc::new(WsManager::with_send_buffer(config.ws.send_buffer));
    let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));
    tokio::spawn(NotificationRouter::new(Arc::clone(&ws_manager)).run(event_bus.subscribe()));

    let audit = Arc::new(MemoryAuditSink::new());
    let orchestrator = Orchestrator::new(
        EventPublisher::new(Arc::clone(&event_bus)),
        audit.clone(),
        RetryPolicy::none(),
        config.worker.step_timeout(),
    );
    let worker_pool = Arc::new(WorkerPool::new(
        Arc::new(orchestrator),
        config.worker.concurrency,
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager,
        event_bus,
        worker_pool,
        upload_plan: Arc::new(plan),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        audit,
    }
}

/// Issue an access token the test app accepts.
pub fn token_for(user_id: UserId) -> String {
    generate_access_token(user_id, "accountant", &test_config().jwt).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(
    app: Router,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    app.oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check().await
}
