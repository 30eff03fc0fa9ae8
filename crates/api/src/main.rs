use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uplink_api::config::ServerConfig;
use uplink_api::notifications::NotificationRouter;
use uplink_api::router::build_app_router;
use uplink_api::state::AppState;
use uplink_api::ws;
use uplink_core::steps::StepDefinition;
use uplink_events::{EventBus, EventPublisher};
use uplink_worker::{Orchestrator, TracingAuditSink, WorkerPool, WorkflowPlan};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "uplink_api=debug,uplink_worker=debug,uplink_events=debug,tower_http=debug".into()
    });
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::with_send_buffer(config.ws.send_buffer));

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&ws_manager),
        config.ws.heartbeat_interval(),
        config.ws.idle_timeout(),
    );

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));

    // Spawn notification router (routes job notifications to user connections).
    let notification_router = NotificationRouter::new(Arc::clone(&ws_manager));
    let router_handle = tokio::spawn(notification_router.run(event_bus.subscribe()));
    tracing::info!(capacity = config.event_bus_capacity, "Event bus and notification router started");

    // --- Worker pool ---
    let orchestrator = Orchestrator::from_config(
        EventPublisher::new(Arc::clone(&event_bus)),
        Arc::new(TracingAuditSink),
        &config.worker,
    );
    let worker_pool = Arc::new(WorkerPool::new(
        Arc::new(orchestrator),
        config.worker.concurrency,
    ));
    let upload_plan = Arc::new(WorkflowPlan::dry_run(
        Arc::new(StepDefinition::oracle_upload()),
        config.worker.dry_run_step_delay(),
    ));
    tracing::info!(
        concurrency = config.worker.concurrency,
        total_steps = upload_plan.total_steps(),
        "Worker pool started",
    );

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
        worker_pool: Arc::clone(&worker_pool),
        upload_plan,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let drain_timeout = config.shutdown_timeout();

    // Let in-flight jobs finish so their terminal notifications still go out.
    if tokio::time::timeout(drain_timeout, worker_pool.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            active = worker_pool.active_jobs(),
            "Worker pool did not drain in time",
        );
    }

    // Dropping the last bus handles (ours and the orchestrator's) closes the
    // broadcast channel, which stops the notification router once it has
    // routed what is buffered.
    drop(worker_pool);
    drop(event_bus);
    let _ = tokio::time::timeout(drain_timeout, router_handle).await;
    tracing::info!("Notification router stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
