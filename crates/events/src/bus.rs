//! In-process broker backed by a `tokio::sync::broadcast` channel.
//!
//! Every published message travels inside a [`UserEnvelope`] addressed to a
//! named per-user channel (`notifications:user:{id}`). Consumers (the
//! connection-side notification router) subscribe once and deliver each
//! envelope to the connections they own for that user. Publisher and
//! consumer share nothing but the bus.

use serde::Serialize;
use tokio::sync::broadcast;
use uplink_core::notification::NotificationMessage;
use uplink_core::types::UserId;

// ---------------------------------------------------------------------------
// UserEnvelope
// ---------------------------------------------------------------------------

/// Prefix of the per-user channel names.
pub const USER_CHANNEL_PREFIX: &str = "notifications:user:";

/// Channel name for a user's notifications.
pub fn user_channel(user_id: UserId) -> String {
    format!("{USER_CHANNEL_PREFIX}{user_id}")
}

/// A notification addressed to one user's channel.
#[derive(Debug, Clone, Serialize)]
pub struct UserEnvelope {
    pub channel: String,
    pub user_id: UserId,
    pub message: NotificationMessage,
}

impl UserEnvelope {
    pub fn new(user_id: UserId, message: NotificationMessage) -> Self {
        Self {
            channel: user_channel(user_id),
            user_id,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// No consumer is attached; the message was dropped.
    #[error("no consumer attached to {channel}")]
    NoSubscribers { channel: String },
}

/// Fan-out notification broker.
///
/// Shared via `Arc<EventBus>`. Publishing never waits: the message is
/// either accepted into the ring buffer or dropped when nobody listens.
///
/// # Loss
///
/// The buffer is bounded. A consumer that falls more than `capacity`
/// messages behind loses the oldest ones and observes
/// `RecvError::Lagged(n)`. There is no offline queue.
pub struct EventBus {
    sender: broadcast::Sender<UserEnvelope>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Hand `message` to the channel of `user_id`.
    ///
    /// Returns the number of consumers that accepted it.
    pub fn publish(
        &self,
        user_id: UserId,
        message: NotificationMessage,
    ) -> Result<usize, PublishError> {
        let envelope = UserEnvelope::new(user_id, message);
        let channel = envelope.channel.clone();
        self.sender
            .send(envelope)
            .map_err(|_| PublishError::NoSubscribers { channel })
    }

    /// Attach a new consumer. It sees every envelope published afterwards.
    pub fn subscribe(&self) -> broadcast::Receiver<UserEnvelope> {
        self.sender.subscribe()
    }

    pub fn consumer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn pong() -> NotificationMessage {
        NotificationMessage::pong()
    }

    #[tokio::test]
    async fn envelope_is_addressed_to_user_channel() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let accepted = bus.publish(42, pong()).expect("consumer attached");
        assert_eq!(accepted, 1);

        let envelope = rx.recv().await.expect("should receive the envelope");
        assert_eq!(envelope.user_id, 42);
        assert_eq!(envelope.channel, "notifications:user:42");
    }

    #[tokio::test]
    async fn every_consumer_sees_every_envelope_in_order() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        for user in 1..=3 {
            bus.publish(user, pong()).unwrap();
        }

        for rx in [&mut rx1, &mut rx2] {
            let users: Vec<UserId> = vec![
                rx.recv().await.unwrap().user_id,
                rx.recv().await.unwrap().user_id,
                rx.recv().await.unwrap().user_id,
            ];
            assert_eq!(users, vec![1, 2, 3]);
        }
    }

    #[test]
    fn publish_without_consumers_drops_message() {
        let bus = EventBus::default();
        assert_matches!(
            bus.publish(5, pong()),
            Err(PublishError::NoSubscribers { channel }) if channel == "notifications:user:5"
        );
    }

    #[tokio::test]
    async fn slow_consumer_loses_oldest_messages() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for user in 1..=5 {
            bus.publish(user, pong()).unwrap();
        }

        assert_matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        );
        assert_eq!(rx.recv().await.unwrap().user_id, 4);
        assert_eq!(rx.recv().await.unwrap().user_id, 5);
    }
}
