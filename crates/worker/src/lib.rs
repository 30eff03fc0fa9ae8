//! Background execution of the Oracle upload workflow.
//!
//! - [`Orchestrator`] / [`JobRunner`] -- per-job step state machine driver
//!   that publishes progress notifications and records audit entries.
//! - [`WorkerPool`] -- bounded concurrent execution of jobs.
//! - [`WorkflowStep`] -- the black-box step interface.

pub mod audit;
pub mod config;
pub mod pool;
pub mod runner;
pub mod step;

pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::WorkerConfig;
pub use pool::{JobHandle, WorkerPool};
pub use runner::{JobOutcome, JobRunner, Orchestrator, StepOutcome};
pub use step::{step_fn, DryRunStep, StepOutput, WorkflowPlan, WorkflowStep};
