//! Immutable identity of one job execution.
//!
//! A [`JobContext`] binds a job to the user who submitted it and the
//! transaction it posts. Every notification a job emits is routed by the
//! context's `user_id`, so the context is validated once at creation and
//! never mutated afterwards.

use serde::Serialize;

use crate::error::CoreError;
use crate::types::{JobId, Timestamp, TransactionId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobContext {
    job_id: JobId,
    user_id: UserId,
    transaction_id: TransactionId,
    started_at: Timestamp,
}

impl JobContext {
    /// Create the context for a new job.
    ///
    /// Fails with [`CoreError::InvalidUser`] when no user is attributed to
    /// the job (`None`) or the id is not a valid account id, and with
    /// [`CoreError::Validation`] for a non-positive transaction id.
    pub fn new(user_id: Option<UserId>, transaction_id: TransactionId) -> Result<Self, CoreError> {
        let user_id = match user_id {
            Some(id) if id > 0 => id,
            Some(id) => {
                return Err(CoreError::InvalidUser(format!(
                    "user id {id} is not a valid account id"
                )))
            }
            None => {
                return Err(CoreError::InvalidUser(
                    "no authenticated user is attributed to the job".to_string(),
                ))
            }
        };

        if transaction_id <= 0 {
            return Err(CoreError::Validation(format!(
                "transaction id {transaction_id} is not valid"
            )));
        }

        Ok(Self {
            job_id: uuid::Uuid::now_v7(),
            user_id,
            transaction_id,
            started_at: chrono::Utc::now(),
        })
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }
}
