//! Job notification publisher.
//!
//! [`EventPublisher`] turns a job transition into a [`NotificationMessage`]
//! and hands it to the [`EventBus`] channel of the job's user. It returns as
//! soon as the bus has accepted (or dropped) the message; delivery to
//! client connections happens asynchronously on the consumer side.

use std::sync::Arc;

use uplink_core::error::CoreError;
use uplink_core::job_context::JobContext;
use uplink_core::notification::{JobEvent, NotificationMessage};
use uplink_core::steps::StepState;

use crate::bus::{EventBus, PublishError};

/// Cheaply cloneable handle used by job runners.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<EventBus>,
}

impl EventPublisher {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Build and publish the notification for `event`.
    ///
    /// Only a build failure ([`CoreError::MalformedMessage`]) is returned.
    /// A message with no attached consumer is dropped and logged; there is
    /// no offline queue.
    pub fn publish(
        &self,
        ctx: &JobContext,
        state: &StepState,
        event: JobEvent,
    ) -> Result<(), CoreError> {
        let message = NotificationMessage::build(ctx, state, &event)?;
        let message_type = message.message_type();

        match self.bus.publish(ctx.user_id(), message) {
            Ok(consumers) => {
                tracing::debug!(
                    job_id = %ctx.job_id(),
                    user_id = ctx.user_id(),
                    transaction_id = ctx.transaction_id(),
                    message_type,
                    consumers,
                    "Notification published",
                );
            }
            Err(PublishError::NoSubscribers { channel }) => {
                tracing::debug!(
                    job_id = %ctx.job_id(),
                    channel = %channel,
                    message_type,
                    "No consumer attached, notification dropped",
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use uplink_core::steps::{StepDefinition, StepTracker};

    use super::*;

    #[tokio::test]
    async fn publishes_to_job_users_channel() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let publisher = EventPublisher::new(Arc::clone(&bus));

        let ctx = JobContext::new(Some(9), 77).unwrap();
        let tracker = StepTracker::new(ctx.job_id(), &StepDefinition::oracle_upload());

        publisher
            .publish(&ctx, &tracker.state(), JobEvent::Started)
            .expect("publish should succeed");

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.user_id, 9);
        assert_eq!(envelope.message.transaction_id(), Some(77));
        assert_eq!(envelope.message.message_type(), "oracle_upload_started");
    }

    #[test]
    fn publish_without_consumer_is_not_an_error() {
        let publisher = EventPublisher::new(Arc::new(EventBus::default()));
        let ctx = JobContext::new(Some(1), 1).unwrap();
        let tracker = StepTracker::new(ctx.job_id(), &StepDefinition::oracle_upload());

        assert!(publisher
            .publish(&ctx, &tracker.state(), JobEvent::Started)
            .is_ok());
    }

    #[tokio::test]
    async fn malformed_event_is_reported_and_not_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let publisher = EventPublisher::new(Arc::clone(&bus));

        let ctx = JobContext::new(Some(1), 1).unwrap();
        let tracker = StepTracker::new(ctx.job_id(), &StepDefinition::oracle_upload());

        let result = publisher.publish(
            &ctx,
            &tracker.state(),
            JobEvent::Failed {
                step_number: Some(1),
                error: String::new(),
            },
        );

        assert_matches!(result, Err(CoreError::MalformedMessage(_)));
        assert!(rx.try_recv().is_err());
    }
}
