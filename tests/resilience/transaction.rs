//! Transaction stickiness and cleanup scenarios.

use aegis::{DbError, Statement};

use crate::support::{client, served_by, Cluster, Mode};

#[tokio::test]
async fn test_transaction_sticks_to_one_endpoint() {
    let cluster = Cluster::new(&[("a", Mode::Up), ("b", Mode::Up)]);
    let client = client(&cluster, &["a", "b"]);

    let mut tx = client.begin_transaction().await.unwrap();
    let pinned = tx.endpoint().clone();

    for _ in 0..5 {
        let result = tx.execute(&Statement::new("UPDATE t SET x = 1")).await.unwrap();
        assert_eq!(served_by(&result), pinned.0.split(':').next().unwrap());
    }
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn test_begin_fails_over_to_healthy_endpoint() {
    let cluster = Cluster::new(&[("a", Mode::Down), ("b", Mode::Up)]);
    let client = client(&cluster, &["a", "b"]);

    let tx = client.begin_transaction().await.unwrap();
    assert!(tx.endpoint().0.starts_with("b"));
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_commit_returns_connection_to_pool() {
    let cluster = Cluster::new(&[("a", Mode::Up)]);
    let client = client(&cluster, &["a"]);

    let mut tx = client.begin_transaction().await.unwrap();
    tx.execute(&Statement::new("UPDATE t SET x = 1")).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(client.health_snapshot()[0].idle_connections, 1);
}

#[tokio::test]
async fn test_dropped_transaction_discards_connection() {
    let cluster = Cluster::new(&[("a", Mode::Up)]);
    let client = client(&cluster, &["a"]);

    let mut tx = client.begin_transaction().await.unwrap();
    tx.execute(&Statement::new("UPDATE t SET x = 1")).await.unwrap();
    drop(tx);

    // The server side may still hold an open transaction on that
    // connection, so it must not be reused.
    assert_eq!(client.health_snapshot()[0].idle_connections, 0);
}

#[tokio::test]
async fn test_endpoint_death_aborts_transaction() {
    let cluster = Cluster::new(&[("a", Mode::Up), ("b", Mode::Up)]);
    let client = client(&cluster, &["a", "b"]);

    let mut tx = client.begin_transaction().await.unwrap();
    cluster.set("a", Mode::Down);
    cluster.set("b", Mode::Down);

    let err = tx
        .execute(&Statement::new("UPDATE t SET x = 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }));

    // The transaction is dead; further use is rejected.
    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_analytical_statement_gets_longer_limit_inside_transaction() {
    let cluster = Cluster::new(&[("a", Mode::Up)]);
    let client = client(&cluster, &["a"]);

    let mut tx = client.begin_transaction().await.unwrap();

    // 1000ms sits past the 500ms normal limit but inside the 2000ms
    // analytical one.
    tx.execute(&Statement::new("SLEEP 1000").analytical())
        .await
        .unwrap();

    // The same statement without the marker is held to the normal limit
    // and aborts the transaction.
    let err = tx.execute(&Statement::new("SLEEP 1000")).await.unwrap_err();
    assert!(matches!(err, DbError::Timeout { .. }));
}

#[tokio::test]
async fn test_statement_error_keeps_transaction_open() {
    let cluster = Cluster::new(&[("a", Mode::Up)]);
    let client = client(&cluster, &["a"]);

    let mut tx = client.begin_transaction().await.unwrap();
    let err = tx.execute(&Statement::new("SELEC 1")).await.unwrap_err();
    assert!(matches!(err, DbError::Statement { .. }));

    // The endpoint answered; the transaction carries on.
    tx.execute(&Statement::new("UPDATE t SET x = 1")).await.unwrap();
    tx.commit().await.unwrap();
}
