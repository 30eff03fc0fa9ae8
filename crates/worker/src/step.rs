//! Workflow steps as black boxes.
//!
//! The orchestrator knows nothing about what a step does (file generation,
//! SFTP upload, import polling...). It only calls [`WorkflowStep::execute`]
//! and looks at the result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uplink_core::error::{CoreError, StepExecutionError};
use uplink_core::job_context::JobContext;
use uplink_core::steps::{StepDefinition, StepSpec};

/// Optional payload a successful step hands back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// Location of an artifact the step produced (e.g. the generated file).
    pub result_path: Option<String>,
}

impl StepOutput {
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            result_path: Some(path.into()),
        }
    }
}

/// One unit of external work.
///
/// Implementations may read the acting user through
/// [`uplink_core::acting_user::current_user_id`]; the runner installs the
/// job's context before calling `execute`.
#[async_trait]
pub trait WorkflowStep: Send + Sync {
    async fn execute(&self, ctx: &JobContext) -> Result<StepOutput, StepExecutionError>;
}

// ---------------------------------------------------------------------------
// Closure adapter
// ---------------------------------------------------------------------------

/// Adapts an async closure into a [`WorkflowStep`].
pub struct FnStep<F>(F);

#[async_trait]
impl<F, Fut> WorkflowStep for FnStep<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, StepExecutionError>> + Send,
{
    async fn execute(&self, ctx: &JobContext) -> Result<StepOutput, StepExecutionError> {
        (self.0)(ctx.clone()).await
    }
}

/// Wrap an async closure as a shareable step.
pub fn step_fn<F, Fut>(f: F) -> Arc<dyn WorkflowStep>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutput, StepExecutionError>> + Send + 'static,
{
    Arc::new(FnStep(f))
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Step that waits and succeeds. Used when no Oracle endpoint is configured.
pub struct DryRunStep {
    name: String,
    delay: Duration,
}

impl DryRunStep {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl WorkflowStep for DryRunStep {
    async fn execute(&self, ctx: &JobContext) -> Result<StepOutput, StepExecutionError> {
        tokio::time::sleep(self.delay).await;
        tracing::debug!(
            job_id = %ctx.job_id(),
            step = %self.name,
            "Dry-run step finished",
        );
        Ok(StepOutput::with_path(format!(
            "dry-run/{}/{}",
            ctx.transaction_id(),
            self.name
        )))
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A step definition paired with one executable step per entry.
pub struct WorkflowPlan {
    definition: Arc<StepDefinition>,
    steps: Vec<Arc<dyn WorkflowStep>>,
}

impl std::fmt::Debug for WorkflowPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowPlan")
            .field("definition", &self.definition)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl WorkflowPlan {
    pub fn new(
        definition: Arc<StepDefinition>,
        steps: Vec<Arc<dyn WorkflowStep>>,
    ) -> Result<Self, CoreError> {
        if steps.len() as u32 != definition.total_steps() {
            return Err(CoreError::Validation(format!(
                "workflow defines {} steps but {} were supplied",
                definition.total_steps(),
                steps.len()
            )));
        }
        Ok(Self { definition, steps })
    }

    /// A plan whose every step is a [`DryRunStep`].
    pub fn dry_run(definition: Arc<StepDefinition>, delay: Duration) -> Self {
        let steps = definition
            .iter()
            .map(|spec| Arc::new(DryRunStep::new(spec.name.clone(), delay)) as Arc<dyn WorkflowStep>)
            .collect();
        Self { definition, steps }
    }

    pub fn definition(&self) -> &Arc<StepDefinition> {
        &self.definition
    }

    pub fn total_steps(&self) -> u32 {
        self.definition.total_steps()
    }

    /// Steps paired with their specs, in execution order.
    pub fn steps(&self) -> impl Iterator<Item = (&StepSpec, &Arc<dyn WorkflowStep>)> {
        self.definition.iter().zip(self.steps.iter())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn plan_requires_one_step_per_definition_entry() {
        let def = Arc::new(StepDefinition::new(["a", "b"]).unwrap());
        let one = vec![step_fn(|_| async { Ok(StepOutput::default()) })];
        assert_matches!(
            WorkflowPlan::new(Arc::clone(&def), one),
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_plan_succeeds_with_paths() {
        let plan = WorkflowPlan::dry_run(
            Arc::new(StepDefinition::oracle_upload()),
            Duration::from_millis(50),
        );
        let ctx = JobContext::new(Some(1), 12).unwrap();

        let mut names = Vec::new();
        for (spec, step) in plan.steps() {
            let out = step.execute(&ctx).await.unwrap();
            assert_eq!(
                out.result_path.as_deref(),
                Some(format!("dry-run/12/{}", spec.name).as_str())
            );
            names.push(spec.name.clone());
        }
        assert_eq!(names.len(), 5);
    }
}
