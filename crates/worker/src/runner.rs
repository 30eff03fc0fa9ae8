//! Worker orchestrator: drives one job through its workflow.
//!
//! [`Orchestrator::start_job`] validates and creates the job's
//! [`JobContext`]. A [`JobRunner`] then owns the job's [`StepTracker`] and
//! turns each [`StepOutcome`] into a state transition, a notification and,
//! on terminal transitions, an audit record. [`Orchestrator::run`] executes a
//! whole [`WorkflowPlan`] with per-step timeouts and bounded retries.
//!
//! Notification failures are logged and swallowed: they never fail, retry
//! or reorder the job.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use uplink_core::acting_user;
use uplink_core::error::{CoreError, StepExecutionError};
use uplink_core::job_context::JobContext;
use uplink_core::notification::JobEvent;
use uplink_core::retry::RetryPolicy;
use uplink_core::steps::{StepDefinition, StepSpec, StepTracker, Transition};
use uplink_core::types::{TransactionId, UserId};
use uplink_events::EventPublisher;

use crate::audit::{AuditOutcome, AuditRecord, AuditSink};
use crate::config::WorkerConfig;
use crate::step::{StepOutput, WorkflowPlan, WorkflowStep};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Input to [`JobRunner::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Enter the first step.
    Begin,
    /// The processing step finished.
    Succeeded(StepOutput),
    /// The processing step failed (after any retries).
    Failed(StepExecutionError),
}

/// Final result of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded {
        result_path: Option<String>,
    },
    Failed {
        step_number: u32,
        error: StepExecutionError,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

// ---------------------------------------------------------------------------
// JobRunner
// ---------------------------------------------------------------------------

/// Per-job state machine driver. Never shared between jobs.
pub struct JobRunner {
    ctx: JobContext,
    definition: Arc<StepDefinition>,
    tracker: StepTracker,
    publisher: EventPublisher,
    audit: Arc<dyn AuditSink>,
}

impl JobRunner {
    pub fn new(
        ctx: JobContext,
        definition: Arc<StepDefinition>,
        publisher: EventPublisher,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let tracker = StepTracker::new(ctx.job_id(), &definition);
        Self {
            ctx,
            definition,
            tracker,
            publisher,
            audit,
        }
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    pub fn tracker(&self) -> &StepTracker {
        &self.tracker
    }

    /// Apply `outcome` to the job.
    ///
    /// Publishes one notification per real transition; once the job is
    /// terminal every call returns [`Transition::Ignored`] and publishes
    /// nothing.
    pub async fn advance(&mut self, outcome: StepOutcome) -> Result<Transition, CoreError> {
        match outcome {
            StepOutcome::Begin => {
                let transition = self.tracker.start()?;
                if let Transition::Started { .. } = transition {
                    tracing::info!(
                        job_id = %self.ctx.job_id(),
                        user_id = self.ctx.user_id(),
                        transaction_id = self.ctx.transaction_id(),
                        total_steps = self.tracker.total_steps(),
                        "Job started",
                    );
                    self.emit(JobEvent::Started);
                }
                Ok(transition)
            }

            StepOutcome::Succeeded(output) => {
                let transition = self.tracker.complete_step()?;
                match transition {
                    Transition::Advanced { completed, .. } => {
                        self.emit_step_completed(completed);
                    }
                    Transition::Completed { last } => {
                        self.emit_step_completed(last);
                        tracing::info!(
                            job_id = %self.ctx.job_id(),
                            result_path = ?output.result_path,
                            "Job completed",
                        );
                        self.emit(JobEvent::Completed {
                            result_path: output.result_path.clone(),
                        });
                        self.record_audit(AuditOutcome::Succeeded, last, None, output.result_path)
                            .await;
                    }
                    _ => {}
                }
                Ok(transition)
            }

            StepOutcome::Failed(error) => {
                let transition = self.tracker.fail()?;
                if let Transition::Failed { step } = transition {
                    tracing::warn!(
                        job_id = %self.ctx.job_id(),
                        step_number = step,
                        error = %error,
                        "Job failed",
                    );
                    self.emit(JobEvent::Failed {
                        step_number: Some(step),
                        error: error.to_string(),
                    });
                    self.record_audit(AuditOutcome::Failed, step, Some(error.to_string()), None)
                        .await;
                }
                Ok(transition)
            }
        }
    }

    fn emit_step_completed(&self, step_number: u32) {
        let step_name = self
            .definition
            .get(step_number)
            .map(|spec| spec.name.clone())
            .unwrap_or_default();
        self.emit(JobEvent::StepCompleted {
            step_number,
            step_name,
            total_steps: self.definition.total_steps(),
        });
    }

    /// Publish, logging instead of propagating build failures.
    fn emit(&self, event: JobEvent) {
        if let Err(e) = self
            .publisher
            .publish(&self.ctx, &self.tracker.state(), event)
        {
            tracing::error!(
                job_id = %self.ctx.job_id(),
                error = %e,
                "Failed to build job notification, continuing without it",
            );
        }
    }

    async fn record_audit(
        &self,
        outcome: AuditOutcome,
        step_number: u32,
        error: Option<String>,
        result_path: Option<String>,
    ) {
        let record = AuditRecord {
            job_id: self.ctx.job_id(),
            user_id: self.ctx.user_id(),
            transaction_id: self.ctx.transaction_id(),
            outcome,
            step_number,
            total_steps: self.definition.total_steps(),
            error,
            result_path,
            started_at: self.ctx.started_at(),
            finished_at: chrono::Utc::now(),
        };
        if let Err(e) = self.audit.record(&record).await {
            tracing::error!(
                job_id = %self.ctx.job_id(),
                error = %e,
                "Failed to record audit entry",
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Shared, stateless job driver. One instance serves the whole pool.
pub struct Orchestrator {
    publisher: EventPublisher,
    audit: Arc<dyn AuditSink>,
    retry: RetryPolicy,
    step_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        publisher: EventPublisher,
        audit: Arc<dyn AuditSink>,
        retry: RetryPolicy,
        step_timeout: Duration,
    ) -> Self {
        Self {
            publisher,
            audit,
            retry,
            step_timeout,
        }
    }

    pub fn from_config(
        publisher: EventPublisher,
        audit: Arc<dyn AuditSink>,
        config: &WorkerConfig,
    ) -> Self {
        Self::new(publisher, audit, config.retry_policy(), config.step_timeout())
    }

    /// Create the context of a new job, rejecting unattributable users.
    pub fn start_job(
        &self,
        user_id: Option<UserId>,
        transaction_id: TransactionId,
    ) -> Result<JobContext, CoreError> {
        let ctx = JobContext::new(user_id, transaction_id).inspect_err(|e| {
            tracing::warn!(
                user_id = ?user_id,
                transaction_id,
                error = %e,
                "Job rejected",
            );
        })?;
        tracing::debug!(
            job_id = %ctx.job_id(),
            user_id = ctx.user_id(),
            transaction_id,
            "Job context created",
        );
        Ok(ctx)
    }

    pub fn runner(&self, ctx: JobContext, definition: Arc<StepDefinition>) -> JobRunner {
        JobRunner::new(
            ctx,
            definition,
            self.publisher.clone(),
            Arc::clone(&self.audit),
        )
    }

    /// Execute every step of `plan` in order for the job `ctx`.
    ///
    /// Runs inside the job's acting-user scope. Stops at the first step
    /// that still fails after its retries.
    pub async fn run(&self, ctx: JobContext, plan: &WorkflowPlan) -> JobOutcome {
        acting_user::scope(ctx.clone(), self.drive(ctx, plan)).await
    }

    async fn drive(&self, ctx: JobContext, plan: &WorkflowPlan) -> JobOutcome {
        let mut runner = self.runner(ctx, Arc::clone(plan.definition()));
        self.apply(&mut runner, StepOutcome::Begin).await;

        let mut result_path = None;
        for (spec, step) in plan.steps() {
            let result = self
                .execute_step(runner.context(), spec, step.as_ref())
                .await;
            match result {
                Ok(output) => {
                    result_path = output.result_path.clone();
                    self.apply(&mut runner, StepOutcome::Succeeded(output)).await;
                }
                Err(error) => {
                    self.apply(&mut runner, StepOutcome::Failed(error.clone()))
                        .await;
                    return JobOutcome::Failed {
                        step_number: spec.step_number,
                        error,
                    };
                }
            }
        }

        JobOutcome::Succeeded { result_path }
    }

    async fn apply(&self, runner: &mut JobRunner, outcome: StepOutcome) {
        if let Err(e) = runner.advance(outcome).await {
            tracing::error!(
                job_id = %runner.context().job_id(),
                error = %e,
                "Rejected step transition",
            );
        }
    }

    /// Run one step with timeout, panic containment and bounded retries.
    async fn execute_step(
        &self,
        ctx: &JobContext,
        spec: &StepSpec,
        step: &dyn WorkflowStep,
    ) -> Result<StepOutput, StepExecutionError> {
        let mut attempt = 1;
        loop {
            tracing::debug!(
                job_id = %ctx.job_id(),
                step_number = spec.step_number,
                step = %spec.name,
                attempt,
                "Executing step",
            );

            let call = AssertUnwindSafe(step.execute(ctx)).catch_unwind();
            let result = match tokio::time::timeout(self.step_timeout, call).await {
                Err(_) => Err(StepExecutionError::Timeout),
                Ok(Err(_panic)) => Err(StepExecutionError::Crashed),
                Ok(Ok(result)) => result,
            };

            match result {
                Ok(output) => return Ok(output),
                Err(error) if self.retry.should_retry(&error, attempt) => {
                    let backoff = self.retry.backoff(attempt);
                    tracing::warn!(
                        job_id = %ctx.job_id(),
                        step_number = spec.step_number,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "Step failed, retrying",
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
