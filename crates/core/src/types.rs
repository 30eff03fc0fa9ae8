/// All account and business-record keys are PostgreSQL BIGSERIAL upstream.
pub type DbId = i64;

/// Id of the user a job is attributed to.
pub type UserId = DbId;

/// Id of the budget transaction being posted to Oracle.
pub type TransactionId = DbId;

/// Per-execution job id (UUID v7, time-ordered).
pub type JobId = uuid::Uuid;

/// Opaque id of one live client connection.
pub type ConnectionId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
