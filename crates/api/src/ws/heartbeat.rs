use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;

/// Spawn a background task that pings every connected client and evicts
/// connections that have been silent for longer than `idle_timeout`.
///
/// The task runs until aborted through the returned `JoinHandle` (done
/// during shutdown).
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    interval: Duration,
    idle_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let evicted = ws_manager.evict_idle(idle_timeout).await;
            if !evicted.is_empty() {
                tracing::info!(count = evicted.len(), "Evicted idle WebSocket connections");
            }

            let count = ws_manager.connection_count().await;
            tracing::debug!(count, "WebSocket heartbeat ping");
            ws_manager.ping_all().await;
        }
    })
}
