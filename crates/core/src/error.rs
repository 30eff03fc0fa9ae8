use crate::types::ConnectionId;

/// Failure of one workflow step's external call.
///
/// The `Display` text is what the client sees in the `error` field of a
/// failure notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepExecutionError {
    #[error("{0}")]
    Failed(String),

    #[error("timeout")]
    Timeout,

    /// The step may have partially applied (e.g. file uploaded but import
    /// status unknown). Never retried.
    #[error("ambiguous result: {0}")]
    Ambiguous(String),

    #[error("worker crashed")]
    Crashed,
}

impl StepExecutionError {
    /// Whether a bounded retry of the same step is allowed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Timeout)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid user: {0}")]
    InvalidUser(String),

    #[error("Step execution failed: {0}")]
    StepExecution(#[from] StepExecutionError),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Delivery to connection {connection_id} failed: {reason}")]
    Delivery {
        connection_id: ConnectionId,
        reason: String,
    },

    #[error("Invalid step transition: {0}")]
    InvalidTransition(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
