//! Workflow step definitions and the per-job step state machine.
//!
//! A [`StepDefinition`] is the fixed, ordered list of named steps shared by
//! every job of one workflow. A [`StepTracker`] walks a single job through
//! that list:
//!
//! ```text
//! NotStarted -> Processing(1) -> ... -> Processing(N) -> Succeeded
//!                    |                        |
//!                    +--------> Failed <------+
//! ```
//!
//! `Succeeded` and `Failed` are terminal; any further call returns
//! [`Transition::Ignored`] so callers can publish exactly once per
//! transition.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::JobId;

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

/// Step names of the Oracle upload/posting workflow, in execution order.
pub const ORACLE_UPLOAD_STEPS: [&str; 5] = [
    "generate_file",
    "upload_file",
    "submit_import",
    "await_import",
    "post_journal",
];

/// One named step of a workflow. `step_number` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub step_number: u32,
    pub name: String,
}

/// Ordered, non-empty sequence of uniquely named steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    steps: Vec<StepSpec>,
}

impl StepDefinition {
    /// Build a definition from step names; numbers are assigned 1..=N.
    pub fn new<I, S>(names: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<StepSpec> = Vec::new();
        for (idx, name) in names.into_iter().enumerate() {
            let name = name.into();
            if name.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "Step {} must have a name",
                    idx + 1
                )));
            }
            if steps.iter().any(|s| s.name == name) {
                return Err(CoreError::Validation(format!(
                    "Duplicate step name '{name}'"
                )));
            }
            steps.push(StepSpec {
                step_number: idx as u32 + 1,
                name,
            });
        }

        if steps.is_empty() {
            return Err(CoreError::Validation(
                "A workflow needs at least one step".to_string(),
            ));
        }

        Ok(Self { steps })
    }

    /// The five-step Oracle upload workflow.
    pub fn oracle_upload() -> Self {
        Self {
            steps: ORACLE_UPLOAD_STEPS
                .iter()
                .enumerate()
                .map(|(idx, name)| StepSpec {
                    step_number: idx as u32 + 1,
                    name: (*name).to_string(),
                })
                .collect(),
        }
    }

    pub fn total_steps(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Look up a step by its 1-based number.
    pub fn get(&self, step_number: u32) -> Option<&StepSpec> {
        step_number
            .checked_sub(1)
            .and_then(|idx| self.steps.get(idx as usize))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepSpec> {
        self.steps.iter()
    }
}

// ---------------------------------------------------------------------------
// Step state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

/// Snapshot of one job's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepState {
    pub job_id: JobId,
    pub current_step_number: u32,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerState {
    NotStarted,
    Processing(u32),
    Succeeded,
    Failed { step: u32 },
}

/// Result of a tracker operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The job entered its first step.
    Started { step_number: u32 },
    /// Step `completed` finished and step `next` is now processing.
    Advanced { completed: u32, next: u32 },
    /// The final step finished; the job succeeded.
    Completed { last: u32 },
    /// Step `step` failed; the job is terminal.
    Failed { step: u32 },
    /// The job was already terminal; nothing changed.
    Ignored,
}

/// Finite-state progression of one job through a [`StepDefinition`].
///
/// Owned exclusively by the job's runner, so it needs no locking.
#[derive(Debug)]
pub struct StepTracker {
    job_id: JobId,
    total_steps: u32,
    state: TrackerState,
}

impl StepTracker {
    pub fn new(job_id: JobId, definition: &StepDefinition) -> Self {
        Self {
            job_id,
            total_steps: definition.total_steps(),
            state: TrackerState::NotStarted,
        }
    }

    /// `NotStarted -> Processing(1)`.
    pub fn start(&mut self) -> Result<Transition, CoreError> {
        match self.state {
            TrackerState::NotStarted => {
                self.state = TrackerState::Processing(1);
                Ok(Transition::Started { step_number: 1 })
            }
            TrackerState::Processing(step) => Err(CoreError::InvalidTransition(format!(
                "job {} already started (processing step {step})",
                self.job_id
            ))),
            TrackerState::Succeeded | TrackerState::Failed { .. } => Ok(Transition::Ignored),
        }
    }

    /// Mark the processing step as done and move to the next one, or to
    /// `Succeeded` after the final step.
    pub fn complete_step(&mut self) -> Result<Transition, CoreError> {
        match self.state {
            TrackerState::NotStarted => Err(CoreError::InvalidTransition(format!(
                "job {} has not started",
                self.job_id
            ))),
            TrackerState::Processing(step) if step >= self.total_steps => {
                self.state = TrackerState::Succeeded;
                Ok(Transition::Completed { last: step })
            }
            TrackerState::Processing(step) => {
                self.state = TrackerState::Processing(step + 1);
                Ok(Transition::Advanced {
                    completed: step,
                    next: step + 1,
                })
            }
            TrackerState::Succeeded | TrackerState::Failed { .. } => Ok(Transition::Ignored),
        }
    }

    /// Fail the processing step. Terminal.
    pub fn fail(&mut self) -> Result<Transition, CoreError> {
        match self.state {
            TrackerState::NotStarted => Err(CoreError::InvalidTransition(format!(
                "job {} cannot fail before it starts",
                self.job_id
            ))),
            TrackerState::Processing(step) => {
                self.state = TrackerState::Failed { step };
                Ok(Transition::Failed { step })
            }
            TrackerState::Succeeded | TrackerState::Failed { .. } => Ok(Transition::Ignored),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TrackerState::Succeeded | TrackerState::Failed { .. }
        )
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    pub fn current_step_number(&self) -> u32 {
        match self.state {
            TrackerState::NotStarted => 0,
            TrackerState::Processing(step) => step,
            TrackerState::Succeeded => self.total_steps,
            TrackerState::Failed { step } => step,
        }
    }

    pub fn state(&self) -> StepState {
        let status = match self.state {
            TrackerState::NotStarted => StepStatus::Pending,
            TrackerState::Processing(_) => StepStatus::Processing,
            TrackerState::Succeeded => StepStatus::Succeeded,
            TrackerState::Failed { .. } => StepStatus::Failed,
        };
        StepState {
            job_id: self.job_id,
            current_step_number: self.current_step_number(),
            status,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn tracker(steps: &[&str]) -> StepTracker {
        let def = StepDefinition::new(steps.iter().copied()).unwrap();
        StepTracker::new(uuid::Uuid::now_v7(), &def)
    }

    #[test]
    fn definition_numbers_steps_from_one() {
        let def = StepDefinition::new(["a", "b", "c"]).unwrap();
        let numbers: Vec<u32> = def.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(def.get(2).map(|s| s.name.as_str()), Some("b"));
        assert!(def.get(0).is_none());
        assert!(def.get(4).is_none());
    }

    #[test]
    fn definition_rejects_empty_duplicate_and_blank() {
        assert_matches!(
            StepDefinition::new(Vec::<String>::new()),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            StepDefinition::new(["a", "a"]),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            StepDefinition::new(["a", " "]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn oracle_upload_has_five_steps() {
        let def = StepDefinition::oracle_upload();
        assert_eq!(def.total_steps(), 5);
        assert_eq!(def.get(1).unwrap().name, "generate_file");
        assert_eq!(def.get(5).unwrap().name, "post_journal");
    }

    #[test]
    fn happy_path_walks_every_step_in_order() {
        let mut t = tracker(&["a", "b", "c"]);
        assert_eq!(t.state().status, StepStatus::Pending);

        assert_eq!(t.start().unwrap(), Transition::Started { step_number: 1 });
        assert_eq!(
            t.complete_step().unwrap(),
            Transition::Advanced { completed: 1, next: 2 }
        );
        assert_eq!(
            t.complete_step().unwrap(),
            Transition::Advanced { completed: 2, next: 3 }
        );
        assert_eq!(t.complete_step().unwrap(), Transition::Completed { last: 3 });

        assert!(t.is_terminal());
        assert_eq!(t.state().status, StepStatus::Succeeded);
        assert_eq!(t.current_step_number(), 3);
    }

    #[test]
    fn failure_is_terminal_and_records_step() {
        let mut t = tracker(&["a", "b"]);
        t.start().unwrap();
        t.complete_step().unwrap();
        assert_eq!(t.fail().unwrap(), Transition::Failed { step: 2 });
        assert_eq!(t.state().status, StepStatus::Failed);
        assert_eq!(t.current_step_number(), 2);
    }

    #[test]
    fn terminal_tracker_ignores_further_calls() {
        let mut t = tracker(&["only"]);
        t.start().unwrap();
        t.complete_step().unwrap();

        assert_eq!(t.start().unwrap(), Transition::Ignored);
        assert_eq!(t.complete_step().unwrap(), Transition::Ignored);
        assert_eq!(t.fail().unwrap(), Transition::Ignored);
        assert_eq!(t.state().status, StepStatus::Succeeded);

        let mut f = tracker(&["a", "b"]);
        f.start().unwrap();
        f.fail().unwrap();
        assert_eq!(f.complete_step().unwrap(), Transition::Ignored);
        assert_eq!(f.current_step_number(), 1);
    }

    #[test]
    fn cannot_skip_start_or_restart() {
        let mut t = tracker(&["a", "b"]);
        assert_matches!(t.complete_step(), Err(CoreError::InvalidTransition(_)));
        assert_matches!(t.fail(), Err(CoreError::InvalidTransition(_)));

        t.start().unwrap();
        assert_matches!(t.start(), Err(CoreError::InvalidTransition(_)));
        assert_eq!(t.current_step_number(), 1);
    }

    #[test]
    fn step_number_never_decreases() {
        let mut t = tracker(&["a", "b", "c", "d"]);
        let mut last = t.current_step_number();
        t.start().unwrap();
        for _ in 0..6 {
            let _ = t.complete_step();
            let now = t.current_step_number();
            assert!(now >= last);
            last = now;
        }
    }
}
