//! Audit recording of terminal job transitions.
//!
//! The orchestrator hands every terminal outcome to an [`AuditSink`]
//! regardless of whether any client is connected. A failing sink is logged
//! and never changes the job's outcome.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use uplink_core::types::{JobId, Timestamp, TransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Succeeded,
    Failed,
}

/// One terminal job transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub job_id: JobId,
    pub user_id: UserId,
    pub transaction_id: TransactionId,
    pub outcome: AuditOutcome,
    /// Last step reached (the failing step on failure).
    pub step_number: u32,
    pub total_steps: u32,
    pub error: Option<String>,
    pub result_path: Option<String>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

#[derive(Debug, thiserror::Error)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Writes each record as a structured `tracing` event on the `audit` target.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let details =
            serde_json::to_string(record).map_err(|e| AuditError(format!("serialize: {e}")))?;
        tracing::info!(
            target: "audit",
            job_id = %record.job_id,
            user_id = record.user_id,
            transaction_id = record.transaction_id,
            outcome = ?record.outcome,
            details = %details,
            "Oracle upload job finished",
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .map_err(|_| AuditError("audit store poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}
