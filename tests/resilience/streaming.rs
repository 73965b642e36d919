//! Streaming query scenarios.

use aegis::{DbError, Statement, Value};

use crate::support::{client, Cluster, Mode};

#[tokio::test]
async fn test_stream_yields_all_rows() {
    let cluster = Cluster::new(&[("a", Mode::Up)]);
    let client = client(&cluster, &["a"]);

    let mut stream = client.stream_query(&Statement::new("SELECT 1")).await.unwrap();
    let mut count = 0;
    while let Some(row) = stream.next().await {
        let row = row.unwrap();
        assert_eq!(row[0], Value::Text("a".to_string()));
        count += 1;
    }
    assert_eq!(count, 5);

    // Cleanly drained stream returns its connection to the pool.
    drop(stream);
    assert_eq!(client.health_snapshot()[0].idle_connections, 1);
}

#[tokio::test]
async fn test_stream_open_fails_over() {
    let cluster = Cluster::new(&[("a", Mode::Down), ("b", Mode::Up)]);
    let client = client(&cluster, &["a", "b"]);

    let stream = client.stream_query(&Statement::new("SELECT 1")).await.unwrap();
    assert!(stream.endpoint().0.starts_with("b"));
    let rows = stream.collect().await.unwrap();
    assert_eq!(rows.len(), 5);
}

#[tokio::test]
async fn test_mid_stream_failure_ends_stream_without_failover() {
    let cluster = Cluster::new(&[("a", Mode::Up), ("b", Mode::Up)]);
    let client = client(&cluster, &["a", "b"]);

    let mut stream = client.stream_query(&Statement::new("SELECT 1")).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first[0], Value::Text("a".to_string()));

    cluster.set("a", Mode::Down);
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }));

    // The stream is over; no silent restart on another endpoint.
    assert!(stream.next().await.is_none());

    // The broken connection was discarded, not repooled.
    drop(stream);
    assert_eq!(client.health_snapshot()[0].idle_connections, 0);
}

#[tokio::test]
async fn test_abandoned_stream_discards_connection() {
    let cluster = Cluster::new(&[("a", Mode::Up)]);
    let client = client(&cluster, &["a"]);

    let mut stream = client.stream_query(&Statement::new("SELECT 1")).await.unwrap();
    let _ = stream.next().await;
    // Dropped with rows unread: the connection state is unknown.
    drop(stream);
    assert_eq!(client.health_snapshot()[0].idle_connections, 0);
}
