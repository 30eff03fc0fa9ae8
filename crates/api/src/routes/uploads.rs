//! Oracle upload job submission.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uplink_core::types::{JobId, Timestamp, TransactionId, UserId};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitUpload {
    pub transaction_id: TransactionId,
}

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub job_id: JobId,
    pub user_id: UserId,
    pub transaction_id: TransactionId,
    pub total_steps: u32,
    pub started_at: Timestamp,
}

/// POST /api/v1/oracle-uploads -- queue an upload for the caller.
///
/// Returns immediately; progress arrives over the caller's WebSocket
/// connections.
pub async fn submit_upload(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<SubmitUpload>,
) -> AppResult<(StatusCode, Json<DataResponse<UploadAccepted>>)> {
    if input.transaction_id <= 0 {
        return Err(AppError::BadRequest(format!(
            "transaction_id must be positive, got {}",
            input.transaction_id
        )));
    }

    let handle = state.worker_pool.submit(
        Some(user.user_id),
        input.transaction_id,
        Arc::clone(&state.upload_plan),
    )?;
    let ctx = &handle.context;

    tracing::info!(
        job_id = %ctx.job_id(),
        user_id = ctx.user_id(),
        transaction_id = ctx.transaction_id(),
        "Oracle upload queued",
    );

    let accepted = UploadAccepted {
        job_id: ctx.job_id(),
        user_id: ctx.user_id(),
        transaction_id: ctx.transaction_id(),
        total_steps: state.upload_plan.total_steps(),
        started_at: ctx.started_at(),
    };

    // The job is detached; its outcome is reported through notifications
    // and the audit sink.
    drop(handle);

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: accepted })))
}
