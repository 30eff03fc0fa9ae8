//! WebSocket message type constants for Oracle upload job events.
//!
//! These are the `type` discriminators clients switch on. They are also the
//! serde tags of [`NotificationMessage`](crate::notification::NotificationMessage).

/// Sent once right after a connection is registered.
pub const MSG_TYPE_CONNECTION_ESTABLISHED: &str = "connection_established";

/// The job was accepted and its first step is running.
pub const MSG_TYPE_JOB_STARTED: &str = "oracle_upload_started";

/// A step finished; the job is still processing.
pub const MSG_TYPE_JOB_PROGRESS: &str = "oracle_upload_progress";

/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "oracle_upload_completed";

/// Job failed with an error.
pub const MSG_TYPE_JOB_FAILED: &str = "oracle_upload_failed";

/// Client heartbeat.
pub const MSG_TYPE_PING: &str = "ping";

/// Server heartbeat reply.
pub const MSG_TYPE_PONG: &str = "pong";
