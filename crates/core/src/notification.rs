//! Wire messages exchanged over a client connection.
//!
//! [`NotificationMessage`] is the server -> client envelope. Each variant is
//! one wire `type`; serde writes the tag, so there is no string dispatch
//! anywhere past this module. [`ClientMessage`] is the (tiny) client ->
//! server vocabulary.
//!
//! Job notifications are built with [`NotificationMessage::build`] from the
//! job's context, its current [`StepState`] and the [`JobEvent`] being
//! announced. Building is deterministic apart from the timestamp, which is
//! taken at construction time.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job_context::JobContext;
use crate::job_events::{
    MSG_TYPE_CONNECTION_ESTABLISHED, MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_FAILED,
    MSG_TYPE_JOB_PROGRESS, MSG_TYPE_JOB_STARTED, MSG_TYPE_PONG,
};
use crate::steps::{StepState, StepStatus};
use crate::types::{Timestamp, TransactionId, UserId};

// ---------------------------------------------------------------------------
// Job events
// ---------------------------------------------------------------------------

/// A job lifecycle transition worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Started,
    StepCompleted {
        step_number: u32,
        step_name: String,
        total_steps: u32,
    },
    Completed {
        result_path: Option<String>,
    },
    Failed {
        step_number: Option<u32>,
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotificationMessage {
    #[serde(rename = "connection_established")]
    ConnectionEstablished { user_id: UserId },

    #[serde(rename = "oracle_upload_started")]
    JobStarted {
        transaction_id: TransactionId,
        message: String,
        timestamp: Timestamp,
    },

    #[serde(rename = "oracle_upload_progress")]
    JobProgress {
        transaction_id: TransactionId,
        step: String,
        step_number: u32,
        total_steps: u32,
        message: String,
        status: StepStatus,
        timestamp: Timestamp,
    },

    #[serde(rename = "oracle_upload_completed")]
    JobCompleted {
        transaction_id: TransactionId,
        message: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_path: Option<String>,
        timestamp: Timestamp,
    },

    #[serde(rename = "oracle_upload_failed")]
    JobFailed {
        transaction_id: TransactionId,
        message: String,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_number: Option<u32>,
        timestamp: Timestamp,
    },

    #[serde(rename = "pong")]
    Pong { timestamp: Timestamp },
}

impl NotificationMessage {
    /// Build the notification for `event` on the job described by `ctx`.
    ///
    /// Returns [`CoreError::MalformedMessage`] when a required field is
    /// missing or inconsistent; that is a programming error in the caller
    /// and must never abort the job.
    pub fn build(ctx: &JobContext, state: &StepState, event: &JobEvent) -> Result<Self, CoreError> {
        if state.job_id != ctx.job_id() {
            return Err(CoreError::MalformedMessage(format!(
                "step state belongs to job {}, not {}",
                state.job_id,
                ctx.job_id()
            )));
        }

        let transaction_id = ctx.transaction_id();
        let timestamp = chrono::Utc::now();

        let message = match event {
            JobEvent::Started => Self::JobStarted {
                transaction_id,
                message: format!("Oracle upload started for transaction {transaction_id}"),
                timestamp,
            },

            JobEvent::StepCompleted {
                step_number,
                step_name,
                total_steps,
            } => {
                if step_name.trim().is_empty() {
                    return Err(CoreError::MalformedMessage(
                        "progress message without a step name".to_string(),
                    ));
                }
                if *step_number == 0 || *step_number > *total_steps {
                    return Err(CoreError::MalformedMessage(format!(
                        "step number {step_number} outside 1..={total_steps}"
                    )));
                }
                Self::JobProgress {
                    transaction_id,
                    step: step_name.clone(),
                    step_number: *step_number,
                    total_steps: *total_steps,
                    message: format!("Step {step_number} of {total_steps} completed: {step_name}"),
                    status: StepStatus::Processing,
                    timestamp,
                }
            }

            JobEvent::Completed { result_path } => Self::JobCompleted {
                transaction_id,
                message: format!("Oracle upload completed for transaction {transaction_id}"),
                success: true,
                result_path: result_path.clone(),
                timestamp,
            },

            JobEvent::Failed { step_number, error } => {
                if error.trim().is_empty() {
                    return Err(CoreError::MalformedMessage(
                        "failure message without an error".to_string(),
                    ));
                }
                let message = match step_number {
                    Some(step) => format!(
                        "Oracle upload failed at step {step} for transaction {transaction_id}"
                    ),
                    None => format!("Oracle upload failed for transaction {transaction_id}"),
                };
                Self::JobFailed {
                    transaction_id,
                    message,
                    error: error.clone(),
                    step_number: *step_number,
                    timestamp,
                }
            }
        };

        Ok(message)
    }

    /// Server heartbeat reply stamped now.
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: chrono::Utc::now(),
        }
    }

    /// The wire `type` of this message.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => MSG_TYPE_CONNECTION_ESTABLISHED,
            Self::JobStarted { .. } => MSG_TYPE_JOB_STARTED,
            Self::JobProgress { .. } => MSG_TYPE_JOB_PROGRESS,
            Self::JobCompleted { .. } => MSG_TYPE_JOB_COMPLETED,
            Self::JobFailed { .. } => MSG_TYPE_JOB_FAILED,
            Self::Pong { .. } => MSG_TYPE_PONG,
        }
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            Self::JobStarted { transaction_id, .. }
            | Self::JobProgress { transaction_id, .. }
            | Self::JobCompleted { transaction_id, .. }
            | Self::JobFailed { transaction_id, .. } => Some(*transaction_id),
            Self::ConnectionEstablished { .. } | Self::Pong { .. } => None,
        }
    }

    pub fn step_number(&self) -> Option<u32> {
        match self {
            Self::JobProgress { step_number, .. } => Some(*step_number),
            Self::JobFailed { step_number, .. } => *step_number,
            _ => None,
        }
    }

    /// `true` for the messages that end a job's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::JobCompleted { .. } | Self::JobFailed { .. })
    }
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// Frames a client may send. Anything else is ignored by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat; the client timestamp is opaque (often epoch millis).
    Ping {
        #[serde(default)]
        timestamp: Option<serde_json::Value>,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::Value;

    use super::*;
    use crate::steps::{StepDefinition, StepTracker};

    fn job() -> (JobContext, StepTracker) {
        let ctx = JobContext::new(Some(3), 4242).unwrap();
        let tracker = StepTracker::new(ctx.job_id(), &StepDefinition::oracle_upload());
        (ctx, tracker)
    }

    fn to_json(msg: &NotificationMessage) -> Value {
        serde_json::to_value(msg).unwrap()
    }

    #[test]
    fn started_message_has_wire_fields() {
        let (ctx, tracker) = job();
        let msg = NotificationMessage::build(&ctx, &tracker.state(), &JobEvent::Started).unwrap();
        let json = to_json(&msg);

        assert_eq!(json["type"], "oracle_upload_started");
        assert_eq!(json["transaction_id"], 4242);
        assert!(json["message"].as_str().unwrap().contains("4242"));
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn progress_message_has_wire_fields() {
        let (ctx, mut tracker) = job();
        tracker.start().unwrap();
        let event = JobEvent::StepCompleted {
            step_number: 1,
            step_name: "generate_file".into(),
            total_steps: 5,
        };
        let json = to_json(&NotificationMessage::build(&ctx, &tracker.state(), &event).unwrap());

        assert_eq!(json["type"], "oracle_upload_progress");
        assert_eq!(json["step"], "generate_file");
        assert_eq!(json["step_number"], 1);
        assert_eq!(json["total_steps"], 5);
        assert_eq!(json["status"], "processing");
    }

    #[test]
    fn completed_omits_absent_result_path() {
        let (ctx, tracker) = job();
        let without = to_json(
            &NotificationMessage::build(
                &ctx,
                &tracker.state(),
                &JobEvent::Completed { result_path: None },
            )
            .unwrap(),
        );
        assert_eq!(without["type"], "oracle_upload_completed");
        assert_eq!(without["success"], true);
        assert!(without.get("result_path").is_none());

        let with = to_json(
            &NotificationMessage::build(
                &ctx,
                &tracker.state(),
                &JobEvent::Completed {
                    result_path: Some("/out/gl_4242.csv".into()),
                },
            )
            .unwrap(),
        );
        assert_eq!(with["result_path"], "/out/gl_4242.csv");
    }

    #[test]
    fn failed_carries_error_and_step() {
        let (ctx, tracker) = job();
        let msg = NotificationMessage::build(
            &ctx,
            &tracker.state(),
            &JobEvent::Failed {
                step_number: Some(5),
                error: "timeout".into(),
            },
        )
        .unwrap();
        assert!(msg.is_terminal());
        let json = to_json(&msg);
        assert_eq!(json["type"], "oracle_upload_failed");
        assert_eq!(json["error"], "timeout");
        assert_eq!(json["step_number"], 5);
    }

    #[test]
    fn missing_fields_are_malformed() {
        let (ctx, tracker) = job();
        let state = tracker.state();

        let blank_step = JobEvent::StepCompleted {
            step_number: 1,
            step_name: "".into(),
            total_steps: 5,
        };
        assert_matches!(
            NotificationMessage::build(&ctx, &state, &blank_step),
            Err(CoreError::MalformedMessage(_))
        );

        let out_of_range = JobEvent::StepCompleted {
            step_number: 6,
            step_name: "x".into(),
            total_steps: 5,
        };
        assert_matches!(
            NotificationMessage::build(&ctx, &state, &out_of_range),
            Err(CoreError::MalformedMessage(_))
        );

        let no_error = JobEvent::Failed {
            step_number: None,
            error: " ".into(),
        };
        assert_matches!(
            NotificationMessage::build(&ctx, &state, &no_error),
            Err(CoreError::MalformedMessage(_))
        );
    }

    #[test]
    fn state_from_another_job_is_malformed() {
        let (ctx, _) = job();
        let (_, other) = job();
        assert_matches!(
            NotificationMessage::build(&ctx, &other.state(), &JobEvent::Started),
            Err(CoreError::MalformedMessage(_))
        );
    }

    #[test]
    fn message_type_matches_serialized_tag() {
        let (ctx, tracker) = job();
        let state = tracker.state();
        let messages = vec![
            NotificationMessage::ConnectionEstablished { user_id: 1 },
            NotificationMessage::build(&ctx, &state, &JobEvent::Started).unwrap(),
            NotificationMessage::build(
                &ctx,
                &state,
                &JobEvent::StepCompleted {
                    step_number: 2,
                    step_name: "upload_file".into(),
                    total_steps: 5,
                },
            )
            .unwrap(),
            NotificationMessage::build(&ctx, &state, &JobEvent::Completed { result_path: None })
                .unwrap(),
            NotificationMessage::build(
                &ctx,
                &state,
                &JobEvent::Failed {
                    step_number: None,
                    error: "boom".into(),
                },
            )
            .unwrap(),
            NotificationMessage::pong(),
        ];

        for msg in messages {
            assert_eq!(to_json(&msg)["type"], msg.message_type());
        }
    }

    #[test]
    fn client_ping_parses_with_or_without_timestamp() {
        let with: ClientMessage =
            serde_json::from_str(r#"{"type":"ping","timestamp":1718000000000}"#).unwrap();
        assert_matches!(with, ClientMessage::Ping { timestamp: Some(_) });

        let without: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_matches!(without, ClientMessage::Ping { timestamp: None });

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }
}
