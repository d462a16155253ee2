//! Integration tests for `SessionRegistry`
//!
//! Tests per-connection isolation and teardown on removal

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use claude_bridge::{
    BridgeError, ConnectionId, SessionOptions, SessionRegistry, SessionState,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cat_registry() -> SessionRegistry {
    SessionRegistry::new(
        SessionOptions::builder()
            .program("cat")
            .args(Vec::<String>::new())
            .stop_grace(Duration::from_millis(500))
            .build(),
    )
}

#[tokio::test]
async fn test_get_or_create_is_idempotent() {
    init_logger();
    let registry = cat_registry();
    let conn = ConnectionId::new("conn-a");

    let first = registry.get_or_create(&conn).await;
    let second = registry.get_or_create(&conn).await;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.state(), SessionState::Idle);
    assert_eq!(first.id().as_str(), "conn-a");
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_concurrent_get_or_create_shares_session() {
    init_logger();
    let registry = cat_registry();
    let conn = ConnectionId::new("shared");

    let (a, b) = tokio::join!(registry.get_or_create(&conn), registry.get_or_create(&conn));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_connections_are_isolated() {
    init_logger();
    let registry = cat_registry();
    let a = ConnectionId::generate();
    let b = ConnectionId::generate();

    let session_a = registry.get_or_create(&a).await;
    let session_b = registry.get_or_create(&b).await;
    assert!(!Arc::ptr_eq(&session_a, &session_b));

    session_a.start().await.unwrap();
    assert_eq!(session_b.state(), SessionState::Idle);

    assert!(registry.remove(&a).await.unwrap());
    assert!(registry.get(&a).await.is_none());
    assert!(registry.get(&b).await.is_some());
}

#[tokio::test]
async fn test_remove_stops_running_session() {
    init_logger();
    let registry = cat_registry();
    let conn = ConnectionId::generate();

    let session = registry.get_or_create(&conn).await;
    session.start().await.unwrap();
    assert!(session.pid().is_some());

    assert!(registry.remove(&conn).await.unwrap());
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.pid(), None);
    assert!(registry.is_empty().await);

    // A stale handle can no longer spawn an orphan
    let err = session.start().await.unwrap_err();
    assert!(matches!(err, BridgeError::SessionClosed(_)), "got {err:?}");
}

#[tokio::test]
async fn test_remove_unknown_connection() {
    init_logger();
    let registry = cat_registry();
    assert!(!registry.remove(&ConnectionId::new("never-seen")).await.unwrap());
}

#[tokio::test]
async fn test_new_session_after_remove() {
    init_logger();
    let registry = cat_registry();
    let conn = ConnectionId::generate();

    let old = registry.get_or_create(&conn).await;
    registry.remove(&conn).await.unwrap();

    let fresh = registry.get_or_create(&conn).await;
    assert!(!Arc::ptr_eq(&old, &fresh));
    fresh.start().await.unwrap();
    assert_eq!(fresh.state(), SessionState::Running);
    registry.remove(&conn).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_everything() {
    init_logger();
    let registry = cat_registry();

    let mut sessions = Vec::new();
    for _ in 0..3 {
        let session = registry.get_or_create(&ConnectionId::generate()).await;
        session.start().await.unwrap();
        sessions.push(session);
    }

    assert_eq!(registry.shutdown().await, 3);
    assert!(registry.is_empty().await);
    for session in sessions {
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.is_closed());
    }
}
