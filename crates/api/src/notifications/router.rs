//! Broker-to-connection routing.
//!
//! [`NotificationRouter`] subscribes to the event bus and hands each
//! envelope to the connections of the addressed user. It is the only
//! consumer the server attaches; workers never see connections.

use std::sync::Arc;

use tokio::sync::broadcast;
use uplink_events::UserEnvelope;

use crate::ws::manager::{text_frame, WsManager};

/// Routes broker envelopes to user connections.
pub struct NotificationRouter {
    ws_manager: Arc<WsManager>,
}

impl NotificationRouter {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run the main routing loop.
    ///
    /// Envelopes are handled strictly in arrival order, so a job's messages
    /// reach each connection in the order they were published. The loop
    /// exits when the channel is closed (i.e. the
    /// [`EventBus`](uplink_events::EventBus) is dropped).
    pub async fn run(self, mut receiver: broadcast::Receiver<UserEnvelope>) {
        loop {
            match receiver.recv().await {
                Ok(envelope) => self.route(&envelope).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification router lagged, messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification router shutting down");
                    break;
                }
            }
        }
    }

    /// Deliver one envelope. Serialized once, shared by every connection.
    async fn route(&self, envelope: &UserEnvelope) {
        let frame = match text_frame(&envelope.message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(
                    channel = %envelope.channel,
                    error = %e,
                    "Dropping unserializable notification",
                );
                return;
            }
        };

        let report = self.ws_manager.deliver(envelope.user_id, frame).await;
        for failure in &report.failed {
            tracing::warn!(
                channel = %envelope.channel,
                message_type = envelope.message.message_type(),
                error = %failure,
                "Notification not delivered",
            );
        }
        tracing::trace!(
            channel = %envelope.channel,
            message_type = envelope.message.message_type(),
            delivered = report.delivered,
            "Notification routed",
        );
    }
}
