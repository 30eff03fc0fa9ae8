//! Uplink notification broker.
//!
//! - [`EventBus`] -- publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, addressing per-user channels.
//! - [`EventPublisher`] -- builds job notifications and hands them to the bus.

pub mod bus;
pub mod publisher;

pub use bus::{EventBus, PublishError, UserEnvelope};
pub use publisher::EventPublisher;
