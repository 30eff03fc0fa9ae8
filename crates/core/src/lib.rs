//! Domain types for the Oracle upload progress pipeline.
//!
//! Pure logic only: job identity, the acting-user scope, step definitions
//! and the step state machine, wire messages, and the step retry policy.
//! Transport, broker and worker concerns live in the other crates.

pub mod acting_user;
pub mod error;
pub mod job_context;
pub mod job_events;
pub mod notification;
pub mod retry;
pub mod steps;
pub mod types;
