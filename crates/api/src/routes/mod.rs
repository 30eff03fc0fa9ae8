pub mod health;
pub mod uploads;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws?token=<jwt>                WebSocket (job notifications)
/// /oracle-uploads                submit upload job (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/oracle-uploads", post(uploads::submit_upload))
}
