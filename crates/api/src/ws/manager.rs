//! Connection registry.
//!
//! Maps each user to the set of their live WebSocket connections (one user,
//! many tabs/devices). Delivery pushes into each connection's bounded
//! outbound queue independently: a full or closed queue only evicts that one
//! connection.

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use uplink_core::error::CoreError;
use uplink_core::notification::NotificationMessage;
use uplink_core::types::{ConnectionId, Timestamp, UserId};

/// Default outbound queue length per connection.
pub const DEFAULT_SEND_BUFFER: usize = 64;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::Sender<Message>;

/// One registered connection.
struct Subscription {
    sender: WsSender,
    /// When this connection was established.
    connected_at: Timestamp,
    /// Last inbound frame (or registration) time, for idle eviction.
    last_seen: Instant,
}

#[derive(Default)]
struct Registry {
    /// user_id -> (connection_id -> subscription)
    by_user: HashMap<UserId, HashMap<ConnectionId, Subscription>>,
    /// connection_id -> user_id
    owners: HashMap<ConnectionId, UserId>,
}

impl Registry {
    fn remove(&mut self, conn_id: &str) -> Option<(UserId, Subscription)> {
        let user_id = self.owners.remove(conn_id)?;
        let user_conns = self.by_user.get_mut(&user_id)?;
        let sub = user_conns.remove(conn_id);
        if user_conns.is_empty() {
            self.by_user.remove(&user_id);
        }
        sub.map(|s| (user_id, s))
    }
}

/// Outcome of one [`WsManager::deliver`] call.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Connections the message was queued on.
    pub delivered: usize,
    /// Connections that could not take the message and were unregistered.
    pub failed: Vec<CoreError>,
}

/// Manages all active WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. All mutation goes through
/// [`register`](Self::register) / [`unregister`](Self::unregister) (and
/// eviction, which is an unregister).
pub struct WsManager {
    registry: RwLock<Registry>,
    send_buffer: usize,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self::with_send_buffer(DEFAULT_SEND_BUFFER)
    }

    /// Create a manager whose per-connection queues hold `send_buffer`
    /// messages.
    pub fn with_send_buffer(send_buffer: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            send_buffer: send_buffer.max(1),
        }
    }

    /// Register a new connection for an authenticated user.
    ///
    /// Returns the new connection id and the receiver half of its outbound
    /// queue; the caller forwards from it to the WebSocket sink.
    pub async fn register(&self, user_id: UserId) -> (ConnectionId, mpsc::Receiver<Message>) {
        let conn_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.send_buffer);
        let sub = Subscription {
            sender: tx,
            connected_at: chrono::Utc::now(),
            last_seen: Instant::now(),
        };

        let mut registry = self.registry.write().await;
        registry
            .by_user
            .entry(user_id)
            .or_default()
            .insert(conn_id.clone(), sub);
        registry.owners.insert(conn_id.clone(), user_id);
        drop(registry);

        tracing::debug!(conn_id = %conn_id, user_id, "Connection registered");
        (conn_id, rx)
    }

    /// Remove a connection. Returns `false` if it was not registered.
    ///
    /// Dropping the subscription closes its queue, which ends the
    /// connection's send task.
    pub async fn unregister(&self, conn_id: &str) -> bool {
        let removed = self.registry.write().await.remove(conn_id);
        match removed {
            Some((user_id, sub)) => {
                let connected_for = chrono::Utc::now() - sub.connected_at;
                tracing::debug!(
                    conn_id = %conn_id,
                    user_id,
                    connected_secs = connected_for.num_seconds(),
                    "Connection unregistered",
                );
                true
            }
            None => false,
        }
    }

    /// Queue `message` on every live connection of `user_id`.
    ///
    /// Each connection is tried independently. A connection whose queue is
    /// full or closed yields a [`CoreError::Delivery`] and is unregistered;
    /// the others are unaffected. With no connections the message is
    /// dropped.
    pub async fn deliver(&self, user_id: UserId, message: Message) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut evict: Vec<ConnectionId> = Vec::new();

        {
            let registry = self.registry.read().await;
            let Some(user_conns) = registry.by_user.get(&user_id) else {
                tracing::trace!(user_id, "No live connections, message dropped");
                return report;
            };

            for (conn_id, sub) in user_conns {
                match sub.sender.try_send(message.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        let reason = match e {
                            mpsc::error::TrySendError::Full(_) => "send buffer full",
                            mpsc::error::TrySendError::Closed(_) => "connection closed",
                        };
                        report.failed.push(CoreError::Delivery {
                            connection_id: conn_id.clone(),
                            reason: reason.to_string(),
                        });
                        evict.push(conn_id.clone());
                    }
                }
            }
        }

        for conn_id in &evict {
            tracing::warn!(conn_id = %conn_id, user_id, "Delivery failed, dropping connection");
            self.unregister(conn_id).await;
        }

        report
    }

    /// Queue a message on one specific connection (heartbeat replies).
    pub async fn send_to_connection(&self, conn_id: &str, message: Message) -> Result<(), CoreError> {
        let registry = self.registry.read().await;
        let sub = registry
            .owners
            .get(conn_id)
            .and_then(|user_id| registry.by_user.get(user_id))
            .and_then(|conns| conns.get(conn_id))
            .ok_or_else(|| CoreError::Delivery {
                connection_id: conn_id.to_string(),
                reason: "not registered".to_string(),
            })?;

        sub.sender
            .try_send(message)
            .map_err(|e| CoreError::Delivery {
                connection_id: conn_id.to_string(),
                reason: e.to_string(),
            })
    }

    /// Record inbound activity on a connection.
    pub async fn touch(&self, conn_id: &str) {
        let mut registry = self.registry.write().await;
        let Some(user_id) = registry.owners.get(conn_id).copied() else {
            return;
        };
        if let Some(sub) = registry
            .by_user
            .get_mut(&user_id)
            .and_then(|conns| conns.get_mut(conn_id))
        {
            sub.last_seen = Instant::now();
        }
    }

    /// Unregister every connection idle for longer than `max_idle`.
    ///
    /// Returns the evicted connection ids.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<ConnectionId> {
        let mut registry = self.registry.write().await;
        let stale: Vec<ConnectionId> = registry
            .by_user
            .values()
            .flat_map(|conns| conns.iter())
            .filter(|(_, sub)| sub.last_seen.elapsed() > max_idle)
            .map(|(conn_id, _)| conn_id.clone())
            .collect();

        for conn_id in &stale {
            registry.remove(conn_id);
        }
        stale
    }

    /// Find all connection IDs associated with a given user.
    pub async fn get_by_user(&self, user_id: UserId) -> Vec<ConnectionId> {
        self.registry
            .read()
            .await
            .by_user
            .get(&user_id)
            .map(|conns| conns.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a connection is currently registered.
    pub async fn is_registered(&self, conn_id: &str) -> bool {
        self.registry.read().await.owners.contains_key(conn_id)
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.owners.len()
    }

    /// Number of live connections for one user.
    pub async fn user_connection_count(&self, user_id: UserId) -> usize {
        self.registry
            .read()
            .await
            .by_user
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    /// Send a Close frame to every connection, then clear the registry.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops.
    pub async fn shutdown_all(&self) {
        let mut registry = self.registry.write().await;
        let count = registry.owners.len();
        for sub in registry.by_user.values().flat_map(HashMap::values) {
            let _ = sub.sender.try_send(Message::Close(None));
        }
        registry.by_user.clear();
        registry.owners.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    ///
    /// A connection whose queue is full simply misses this ping; idle
    /// eviction is driven by inbound traffic, not by ping delivery.
    pub async fn ping_all(&self) {
        let registry = self.registry.read().await;
        for sub in registry.by_user.values().flat_map(HashMap::values) {
            let _ = sub.sender.try_send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a notification into a WebSocket text frame.
pub fn text_frame(message: &NotificationMessage) -> Result<Message, CoreError> {
    let json = serde_json::to_string(message)
        .map_err(|e| CoreError::MalformedMessage(format!("serialize {}: {e}", message.message_type())))?;
    Ok(Message::Text(json.into()))
}
