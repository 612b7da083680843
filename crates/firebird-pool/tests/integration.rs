//! Connection pool tests against the mock GDS server.
//!
//! Run with:
//! ```bash
//! cargo test -p firebird-pool --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use firebird_client::{Command, SqlValue};
use firebird_pool::{ConnectionPool, FirebirdManager, PoolConfig, PoolError, PoolStatus};
use firebird_testing::fixtures::int_column;
use firebird_testing::{MockEvent, MockGdsServer, MockStatement};

async fn server() -> MockGdsServer {
    MockGdsServer::builder()
        .with_statement("UPDATE COUNTERS SET HITS = HITS + 1", MockStatement::update(1))
        .with_statement(
            "SELECT COUNT(*) FROM COUNTERS",
            MockStatement::select(vec![int_column("COUNT")], vec![vec![SqlValue::Int(3)]]),
        )
        .build()
        .await
        .unwrap()
}

fn manual_pool() -> ConnectionPool<FirebirdManager> {
    ConnectionPool::new(
        FirebirdManager,
        PoolConfig::new().sweep_interval(Duration::from_secs(3600)),
    )
    .unwrap()
}

fn connects(server: &MockGdsServer) -> usize {
    server.count_events(|e| matches!(e, MockEvent::Connect))
}

fn detaches(server: &MockGdsServer) -> usize {
    server.count_events(|e| matches!(e, MockEvent::Detach))
}

// =============================================================================
// Reuse
// =============================================================================

#[tokio::test]
async fn test_connection_reused_for_same_string() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = server.connection_string("test.fdb");

    let mut session = pool.get_connection(&conn_str).await.unwrap();
    let id = session.id();
    let affected = Command::new("UPDATE COUNTERS SET HITS = HITS + 1")
        .execute_non_query(&mut session)
        .await
        .unwrap();
    assert_eq!(affected, 1);
    pool.free_connection(session).await.unwrap();

    let mut session = pool.get_connection(&conn_str).await.unwrap();
    assert_eq!(session.id(), id);
    let count = Command::new("SELECT COUNT(*) FROM COUNTERS")
        .execute_scalar(&mut session)
        .await
        .unwrap();
    assert_eq!(count, SqlValue::Int(3));
    drop(session);

    assert_eq!(connects(&server), 1);
    // The reused session was pinged before hand-out.
    assert_eq!(
        server.count_events(|e| matches!(e, MockEvent::InfoDatabase)),
        1
    );
    assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 0 });

    pool.shutdown().await.unwrap();
    assert_eq!(detaches(&server), 1);
}

#[tokio::test]
async fn test_different_strings_get_different_connections() {
    let server = server().await;
    let pool = manual_pool();

    let a = pool
        .get_connection(&server.connection_string("a.fdb"))
        .await
        .unwrap();
    let a_id = a.id();
    drop(a);

    let b = pool
        .get_connection(&server.connection_string("b.fdb"))
        .await
        .unwrap();
    assert_ne!(b.id(), a_id);
    assert_eq!(connects(&server), 2);
}

// =============================================================================
// Lifetime
// =============================================================================

#[tokio::test]
async fn test_expired_connection_is_swept() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = format!(
        "{};Connection Lifetime=1",
        server.connection_string("test.fdb")
    );

    drop(pool.get_connection(&conn_str).await.unwrap());
    assert_eq!(pool.sweep().await, 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(pool.sweep().await, 1);
    assert_eq!(pool.status().idle, 0);
    assert_eq!(detaches(&server), 1);

    drop(pool.get_connection(&conn_str).await.unwrap());
    assert_eq!(connects(&server), 2);
}

#[tokio::test]
async fn test_expired_connection_replaced_on_checkout() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = format!(
        "{};Connection Lifetime=1",
        server.connection_string("test.fdb")
    );

    let first = pool.get_connection(&conn_str).await.unwrap();
    let first_id = first.id();
    drop(first);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let second = pool.get_connection(&conn_str).await.unwrap();
    assert_ne!(second.id(), first_id);
    assert_eq!(connects(&server), 2);
    assert_eq!(detaches(&server), 1);
}

// =============================================================================
// Reset and liveness
// =============================================================================

#[tokio::test]
async fn test_free_connection_rolls_back_open_transaction() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = server.connection_string("test.fdb");

    let mut session = pool.get_connection(&conn_str).await.unwrap();
    let _tx = session.begin_transaction().await.unwrap();
    assert!(session.in_transaction());
    pool.free_connection(session).await.unwrap();

    assert_eq!(
        server.count_events(|e| matches!(e, MockEvent::Rollback(_))),
        1
    );
    let session = pool.get_connection(&conn_str).await.unwrap();
    assert!(!session.in_transaction());
}

#[tokio::test]
async fn test_dead_connection_is_replaced() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = server.connection_string("test.fdb");

    let first = pool.get_connection(&conn_str).await.unwrap();
    let first_id = first.id();
    drop(first);

    server.kill_connections();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = pool.get_connection(&conn_str).await.unwrap();
    assert_ne!(second.id(), first_id);
    second.ping().await.unwrap();
    assert_eq!(connects(&server), 2);
}

#[tokio::test]
async fn test_connect_failure_is_passed_through() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = format!("{};Port=1", server.connection_string("test.fdb"));

    let err = pool.get_connection(&conn_str).await.unwrap_err();
    assert!(matches!(err, PoolError::Connect(_)));
    assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 0 });
}

// =============================================================================
// Sizing and clearing
// =============================================================================

#[tokio::test]
async fn test_min_pool_size_opens_connections_up_front() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = format!("{};Min Pool Size=2", server.connection_string("test.fdb"));

    let session = pool.get_connection(&conn_str).await.unwrap();
    assert_eq!(connects(&server), 2);
    assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 1 });
    drop(session);
    assert_eq!(pool.status(), PoolStatus { idle: 2, in_use: 0 });
}

#[tokio::test]
async fn test_max_pool_size_times_out() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = format!(
        "{};Max Pool Size=1;Connection Timeout=1",
        server.connection_string("test.fdb")
    );

    let held = pool.get_connection(&conn_str).await.unwrap();
    let err = pool.get_connection(&conn_str).await.unwrap_err();
    assert!(matches!(err, PoolError::Timeout));
    assert_eq!(err.to_string(), "Timeout exceeded.");
    assert_eq!(connects(&server), 1);

    drop(held);
    let again = pool.get_connection(&conn_str).await.unwrap();
    drop(again);
    assert_eq!(connects(&server), 1);
}

#[tokio::test]
async fn test_clear_disconnects_idle_and_returned_sessions() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = server.connection_string("test.fdb");

    let held = pool.get_connection(&conn_str).await.unwrap();
    drop(pool.get_connection(&conn_str).await.unwrap());
    pool.clear().await.unwrap();
    assert_eq!(detaches(&server), 1);

    drop(held);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(detaches(&server), 2);
    assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 0 });
}

// =============================================================================
// Pooling key
// =============================================================================

#[tokio::test]
async fn test_open_checks_out_when_pooling_is_on() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = server.connection_string("test.fdb");

    let mut session = pool.open(&conn_str).await.unwrap();
    assert!(session.is_pooled());
    let affected = Command::new("UPDATE COUNTERS SET HITS = HITS + 1")
        .execute_non_query(&mut session)
        .await
        .unwrap();
    assert_eq!(affected, 1);
    session.close(&pool).await.unwrap();

    assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 0 });
    assert_eq!(detaches(&server), 0);
}

#[tokio::test]
async fn test_open_connects_directly_when_pooling_is_off() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = format!("{};Pooling=false", server.connection_string("test.fdb"));

    let mut session = pool.open(&conn_str).await.unwrap();
    assert!(!session.is_pooled());
    assert!(!session.config().pooling);
    assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 0 });
    let affected = Command::new("UPDATE COUNTERS SET HITS = HITS + 1")
        .execute_non_query(&mut session)
        .await
        .unwrap();
    assert_eq!(affected, 1);
    session.close(&pool).await.unwrap();

    assert_eq!(connects(&server), 1);
    assert_eq!(detaches(&server), 1);
    assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 0 });
}

// =============================================================================
// Shutdown and the global pool
// =============================================================================

#[tokio::test]
async fn test_shutdown_rejects_checkout() {
    let server = server().await;
    let pool = manual_pool();
    let conn_str = server.connection_string("test.fdb");

    drop(pool.get_connection(&conn_str).await.unwrap());
    pool.shutdown().await.unwrap();

    assert!(pool.is_closed());
    assert!(matches!(
        pool.get_connection(&conn_str).await.unwrap_err(),
        PoolError::PoolClosed
    ));
    assert_eq!(detaches(&server), 1);
}

#[tokio::test]
async fn test_global_pool() {
    let server = server().await;
    let conn_str = format!("{};Charset=UTF8", server.connection_string("global.fdb"));

    let mut session = firebird_pool::get_connection(&conn_str).await.unwrap();
    let id = session.id();
    Command::new("UPDATE COUNTERS SET HITS = HITS + 1")
        .execute_non_query(&mut session)
        .await
        .unwrap();
    firebird_pool::free_connection(session).await.unwrap();

    let session = firebird_pool::get_connection(&conn_str).await.unwrap();
    assert_eq!(session.id(), id);
    assert_eq!(connects(&server), 1);
    assert!(std::ptr::eq(
        firebird_pool::global().unwrap(),
        firebird_pool::global().unwrap()
    ));
}
