//! Endpoint loss and recovery scenarios.

use std::time::Duration;

use aegis::{DbError, ErrorKind, ExecError, Statement};

use crate::support::{client, served_by, test_config, Cluster, Mode};

#[tokio::test]
async fn test_traffic_flows_through_surviving_endpoint() {
    let cluster = Cluster::new(&[("a", Mode::Down), ("b", Mode::Down), ("c", Mode::Up)]);
    let client = client(&cluster, &["a", "b", "c"]);

    for _ in 0..5 {
        let result = client.execute_query(&Statement::new("SELECT 1")).await.unwrap();
        assert_eq!(served_by(&result), "c");
    }
}

#[tokio::test(start_paused = true)]
async fn test_endpoints_killed_mid_run() {
    let cluster = Cluster::new(&[("a", Mode::Up), ("b", Mode::Up), ("c", Mode::Up)]);
    let client = client(&cluster, &["a", "b", "c"]);

    client.execute_query(&Statement::new("SELECT 1")).await.unwrap();

    cluster.set("a", Mode::Down);
    cluster.set("b", Mode::Down);

    // Pooled connections to dead endpoints fail on use, traffic settles on c.
    for _ in 0..5 {
        let result = client.execute_query(&Statement::new("SELECT 1")).await.unwrap();
        assert_eq!(served_by(&result), "c");
    }
}

#[tokio::test(start_paused = true)]
async fn test_all_endpoints_down_then_restored() {
    let cluster = Cluster::new(&[("a", Mode::Up), ("b", Mode::Up)]);
    let client = client(&cluster, &["a", "b"]);

    cluster.set("a", Mode::Down);
    cluster.set("b", Mode::Down);

    let err = client.execute_query(&Statement::new("SELECT 1")).await.unwrap_err();
    assert!(matches!(err, ExecError::Db(DbError::Unavailable { .. })));

    cluster.set("a", Mode::Up);
    cluster.set("b", Mode::Up);

    let result = client.execute_query(&Statement::new("SELECT 1")).await.unwrap();
    assert!(["a", "b"].contains(&served_by(&result).as_str()));

    // No leaked checkouts: everything borrowed so far is back or discarded.
    let total_idle: usize = client
        .health_snapshot()
        .iter()
        .map(|s| s.idle_connections)
        .sum();
    assert!(total_idle <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_hung_endpoint_does_not_stall_queries() {
    let cluster = Cluster::new(&[("a", Mode::Hang), ("b", Mode::Up)]);
    let client = client(&cluster, &["a", "b"]);

    let started = tokio::time::Instant::now();
    let result = client.execute_query(&Statement::new("SELECT 1")).await.unwrap();
    assert_eq!(served_by(&result), "b");
    // Bounded by the acquire timeout on a, not by the hang.
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_probe_recovers_endpoint_without_traffic() {
    let cluster = Cluster::new(&[("a", Mode::Down), ("b", Mode::Up)]);
    let mut config = test_config(&["a", "b"]);
    config.probe.enabled = true;
    let client = aegis::DbClient::new(config, cluster.clone()).unwrap();

    // First query marks a unhealthy and lands on b.
    let result = client.execute_query(&Statement::new("SELECT 1")).await.unwrap();
    assert_eq!(served_by(&result), "b");
    let snapshot = client.health_snapshot();
    assert!(!snapshot[0].healthy);

    cluster.set("a", Mode::Up);
    // Two probe intervals is enough for the prober to notice.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let snapshot = client.health_snapshot();
    assert!(snapshot[0].healthy, "probe should have restored a");

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_endpoint_reeligible_after_grace() {
    let cluster = Cluster::new(&[("a", Mode::Down), ("b", Mode::Up)]);
    let mut config = test_config(&["a", "b"]);
    config.probe.enabled = true; // Active mode: eligibility actually excludes
    config.probe.interval_ms = 60_000; // but probes stay out of this test's way
    let client = aegis::DbClient::new(config, cluster.clone()).unwrap();

    let _ = client.execute_query(&Statement::new("SELECT 1")).await.unwrap();
    assert!(!client.health_snapshot()[0].healthy);

    cluster.set("a", Mode::Up);
    // Before the grace period, a stays excluded even though it is back.
    let result = client.execute_query(&Statement::new("SELECT 1")).await.unwrap();
    assert_eq!(served_by(&result), "b");

    tokio::time::sleep(Duration::from_millis(6000)).await;

    // Past the grace period live traffic gets to try a again.
    let mut hosts = Vec::new();
    for _ in 0..4 {
        let result = client.execute_query(&Statement::new("SELECT 1")).await.unwrap();
        hosts.push(served_by(&result));
    }
    assert!(hosts.iter().any(|h| h == "a"));

    client.shutdown().await;
}

#[tokio::test]
async fn test_passive_only_mode_never_excludes() {
    let cluster = Cluster::new(&[("a", Mode::Up)]);
    let client = client(&cluster, &["a"]);

    // Probing is off, so mode is passive and eligibility never filters.
    assert_eq!(
        client.health_snapshot().len(),
        1,
        "single endpoint registered"
    );
    let result = client.execute_query(&Statement::new("SELECT 1")).await.unwrap();
    assert_eq!(served_by(&result), "a");
}

#[tokio::test]
async fn test_statement_error_does_not_mark_unhealthy() {
    let cluster = Cluster::new(&[("a", Mode::Up)]);
    let client = client(&cluster, &["a"]);

    let err = client.execute_query(&Statement::new("SELEC 1")).await.unwrap_err();
    match err {
        ExecError::Db(e) => assert_eq!(e.kind(), ErrorKind::Statement),
        other => panic!("expected fatal statement error, got {other:?}"),
    }
    let snapshot = client.health_snapshot();
    assert!(snapshot[0].healthy);
    assert_eq!(snapshot[0].consecutive_failures, 0);
}
