use std::sync::Arc;

use uplink_events::EventBus;
use uplink_worker::{WorkerPool, WorkflowPlan};

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Live client connections, keyed by user.
    pub ws_manager: Arc<WsManager>,
    /// Notification broker shared by workers and the notification router.
    pub event_bus: Arc<EventBus>,
    /// Bounded executor for upload jobs.
    pub worker_pool: Arc<WorkerPool>,
    /// Step plan every submitted upload runs.
    pub upload_plan: Arc<WorkflowPlan>,
}
