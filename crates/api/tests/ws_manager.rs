//! Tests for the connection registry (`WsManager`).
//!
//! These exercise the manager directly, without HTTP upgrades: per-user
//! isolation, independent delivery, eviction and shutdown.

use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::ws::Message;
use uplink_api::ws::WsManager;
use uplink_core::error::CoreError;

fn text(s: &str) -> Message {
    Message::Text(s.to_string().into())
}

// ---------------------------------------------------------------------------
// Test: register / unregister bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_manager_has_zero_connections() {
    let manager = WsManager::new();

    assert_eq!(manager.connection_count().await, 0);
    assert_eq!(manager.user_connection_count(1).await, 0);
}

#[tokio::test]
async fn register_tracks_connections_per_user() {
    let manager = WsManager::new();

    let (a1, _rx1) = manager.register(1).await;
    let (a2, _rx2) = manager.register(1).await;
    let (_b1, _rx3) = manager.register(2).await;

    assert_ne!(a1, a2);
    assert_eq!(manager.connection_count().await, 3);
    assert_eq!(manager.user_connection_count(1).await, 2);
    assert_eq!(manager.user_connection_count(2).await, 1);

    let mut ids = manager.get_by_user(1).await;
    ids.sort();
    let mut expected = vec![a1, a2];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn unregister_unknown_id_is_noop() {
    let manager = WsManager::new();
    let (_conn, _rx) = manager.register(1).await;

    assert!(!manager.unregister("nonexistent").await);
    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: delivery reaches only the addressed user
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deliver_never_crosses_users() {
    let manager = WsManager::new();
    let (_a, mut rx_a) = manager.register(1).await;
    let (_b, mut rx_b) = manager.register(2).await;

    let report = manager.deliver(1, text("for-a")).await;

    assert_eq!(report.delivered, 1);
    assert!(report.failed.is_empty());
    assert_eq!(rx_a.try_recv().unwrap(), text("for-a"));
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn deliver_fans_out_to_every_connection_of_the_user() {
    let manager = WsManager::new();
    let (_c1, mut rx1) = manager.register(7).await;
    let (_c2, mut rx2) = manager.register(7).await;

    let report = manager.deliver(7, text("hello")).await;

    assert_eq!(report.delivered, 2);
    assert_eq!(rx1.try_recv().unwrap(), text("hello"));
    assert_eq!(rx2.try_recv().unwrap(), text("hello"));
}

#[tokio::test]
async fn deliver_without_connections_drops_silently() {
    let manager = WsManager::new();

    let report = manager.deliver(42, text("nobody")).await;

    assert_eq!(report.delivered, 0);
    assert!(report.failed.is_empty());
}

// ---------------------------------------------------------------------------
// Test: a failing connection is evicted alone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_queue_evicts_only_that_connection() {
    let manager = WsManager::with_send_buffer(1);
    let (slow, _slow_rx) = manager.register(1).await;
    let (fast, mut fast_rx) = manager.register(1).await;

    // Fills both queues; the fast client drains, the slow one never does.
    manager.deliver(1, text("first")).await;
    assert_eq!(fast_rx.try_recv().unwrap(), text("first"));

    let report = manager.deliver(1, text("second")).await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed.len(), 1);
    assert_matches!(
        &report.failed[0],
        CoreError::Delivery { connection_id, reason }
            if *connection_id == slow && reason == "send buffer full"
    );
    assert!(!manager.is_registered(&slow).await);
    assert!(manager.is_registered(&fast).await);
    assert_eq!(fast_rx.try_recv().unwrap(), text("second"));
}

#[tokio::test]
async fn dropped_receiver_is_evicted_on_next_delivery() {
    let manager = WsManager::new();
    let (gone, gone_rx) = manager.register(3).await;
    let (_live, mut live_rx) = manager.register(3).await;
    drop(gone_rx);

    let report = manager.deliver(3, text("still here")).await;

    assert_eq!(report.delivered, 1);
    assert_matches!(&report.failed[0], CoreError::Delivery { reason, .. } if reason == "connection closed");
    assert!(!manager.is_registered(&gone).await);
    assert_eq!(live_rx.try_recv().unwrap(), text("still here"));
}

#[tokio::test]
async fn disconnecting_one_of_many_leaves_the_rest_untouched() {
    let manager = WsManager::new();
    let mut conns = Vec::new();
    for _ in 0..4 {
        conns.push(manager.register(9).await);
    }

    let (closed_id, _closed_rx) = conns.remove(1);
    assert!(manager.unregister(&closed_id).await);

    let report = manager.deliver(9, text("tick")).await;
    assert_eq!(report.delivered, 3);
    for (_, rx) in &mut conns {
        assert_eq!(rx.try_recv().unwrap(), text("tick"));
    }
}

// ---------------------------------------------------------------------------
// Test: single-connection sends and liveness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_to_connection_targets_one_connection() {
    let manager = WsManager::new();
    let (c1, mut rx1) = manager.register(1).await;
    let (_c2, mut rx2) = manager.register(1).await;

    manager.send_to_connection(&c1, text("pong")).await.unwrap();

    assert_eq!(rx1.try_recv().unwrap(), text("pong"));
    assert!(rx2.try_recv().is_err());
    assert_matches!(
        manager.send_to_connection("missing", text("x")).await,
        Err(CoreError::Delivery { .. })
    );
}

#[tokio::test(start_paused = true)]
async fn evict_idle_removes_only_silent_connections() {
    let manager = WsManager::new();
    let (quiet, _quiet_rx) = manager.register(1).await;
    let (chatty, _chatty_rx) = manager.register(1).await;

    tokio::time::advance(Duration::from_secs(60)).await;
    manager.touch(&chatty).await;
    tokio::time::advance(Duration::from_secs(40)).await;

    let evicted = manager.evict_idle(Duration::from_secs(90)).await;

    assert_eq!(evicted, vec![quiet.clone()]);
    assert!(!manager.is_registered(&quiet).await);
    assert!(manager.is_registered(&chatty).await);
}

// ---------------------------------------------------------------------------
// Test: shutdown_all
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();
    let (_a, mut rx_a) = manager.register(1).await;
    let (_b, mut rx_b) = manager.register(2).await;

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert_matches!(rx_a.recv().await, Some(Message::Close(None)));
    assert_matches!(rx_b.recv().await, Some(Message::Close(None)));
    // Senders are dropped with the registry, closing the queues.
    assert!(rx_a.recv().await.is_none());
}

#[tokio::test]
async fn ping_all_reaches_every_connection() {
    let manager = WsManager::new();
    let (_a, mut rx_a) = manager.register(1).await;
    let (_b, mut rx_b) = manager.register(2).await;

    manager.ping_all().await;

    assert_matches!(rx_a.try_recv(), Ok(Message::Ping(_)));
    assert_matches!(rx_b.try_recv(), Ok(Message::Ping(_)));
}
