//! Bounded pool of job executions.
//!
//! Each job is one tokio task. A semaphore caps how many run at once; jobs
//! over the limit wait for a permit. Jobs share nothing but the
//! [`Orchestrator`] (stateless) and, through it, the event bus.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uplink_core::error::CoreError;
use uplink_core::job_context::JobContext;
use uplink_core::types::{TransactionId, UserId};

use crate::runner::{JobOutcome, Orchestrator};
use crate::step::WorkflowPlan;

/// A submitted job.
#[derive(Debug)]
pub struct JobHandle {
    pub context: JobContext,
    join: JoinHandle<JobOutcome>,
}

impl JobHandle {
    /// Wait for the job to finish.
    ///
    /// Dropping the handle instead detaches the job; it keeps running.
    pub async fn outcome(self) -> Result<JobOutcome, CoreError> {
        self.join
            .await
            .map_err(|e| CoreError::Internal(format!("job task failed: {e}")))
    }
}

pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(orchestrator: Arc<Orchestrator>, concurrency: usize) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Validate and enqueue a job.
    ///
    /// Unattributable users are rejected here, before anything is spawned
    /// or published.
    pub fn submit(
        &self,
        user_id: Option<UserId>,
        transaction_id: TransactionId,
        plan: Arc<WorkflowPlan>,
    ) -> Result<JobHandle, CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Internal(
                "worker pool is shutting down".to_string(),
            ));
        }

        let ctx = self.orchestrator.start_job(user_id, transaction_id)?;

        let span = tracing::info_span!(
            "job",
            job_id = %ctx.job_id(),
            user_id = ctx.user_id(),
            transaction_id = ctx.transaction_id(),
        );
        let orchestrator = Arc::clone(&self.orchestrator);
        let permits = Arc::clone(&self.permits);
        let job_ctx = ctx.clone();

        let join = self.tracker.spawn(
            async move {
                // The semaphore is never closed, so acquisition only waits.
                let _permit = permits.acquire_owned().await.ok();
                orchestrator.run(job_ctx, &plan).await
            }
            .instrument(span),
        );

        Ok(JobHandle { context: ctx, join })
    }

    /// Jobs submitted and not yet finished (running or waiting for a permit).
    pub fn active_jobs(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting jobs and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        tracing::info!(active = self.tracker.len(), "Waiting for in-flight jobs");
        self.tracker.wait().await;
        tracing::info!("Worker pool drained");
    }
}
