//! Shared fake backend cluster for the resilience scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use aegis::{
    Config, Connector, DbClient, DbError, QueryResult, RawConnection, Row, Statement, Value,
};

/// Per-test log capture; `RUST_LOG` narrows or widens it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .with_test_writer()
        .try_init();
}

/// What a fake endpoint does when dialed or queried.
#[derive(Clone, Copy, PartialEq)]
pub enum Mode {
    /// Accepts connections and answers queries.
    Up,
    /// Refuses connections; established connections fail on use.
    Down,
    /// Accepts nothing and never answers (black hole).
    Hang,
}

struct State {
    modes: Mutex<HashMap<String, Mode>>,
    connects: AtomicUsize,
}

/// A cluster of scriptable fake endpoints behind one [`Connector`].
pub struct Cluster {
    state: Arc<State>,
}

impl Cluster {
    pub fn new(hosts: &[(&str, Mode)]) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(State {
                modes: Mutex::new(
                    hosts
                        .iter()
                        .map(|(h, m)| (h.to_string(), *m))
                        .collect(),
                ),
                connects: AtomicUsize::new(0),
            }),
        })
    }

    /// Kill or restore an endpoint mid-test.
    pub fn set(&self, host: &str, mode: Mode) {
        self.state.modes.lock().insert(host.to_string(), mode);
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }
}

struct ClusterConn {
    state: Arc<State>,
    host: String,
    rows_left: usize,
}

impl ClusterConn {
    fn mode(&self) -> Mode {
        self.state
            .modes
            .lock()
            .get(&self.host)
            .copied()
            .unwrap_or(Mode::Up)
    }

    async fn check_up(&self) -> Result<(), DbError> {
        match self.mode() {
            Mode::Up => Ok(()),
            Mode::Down => Err(DbError::connection("connection reset by peer")),
            Mode::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

#[async_trait]
impl RawConnection for ClusterConn {
    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, DbError> {
        self.check_up().await?;
        // "SLEEP <ms>" simulates a statement that takes that long to run.
        if let Some(ms) = statement
            .sql
            .strip_prefix("SLEEP ")
            .and_then(|ms| ms.parse::<u64>().ok())
        {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if statement.sql.starts_with("SELEC ") {
            return Err(DbError::Statement {
                code: 1064,
                message: "You have an error in your SQL syntax".to_string(),
            });
        }
        Ok(QueryResult {
            columns: vec!["served_by".to_string()],
            rows: vec![vec![Value::Text(self.host.clone())]],
            affected: 0,
        })
    }

    async fn open_stream(&mut self, _statement: &Statement) -> Result<(), DbError> {
        self.check_up().await?;
        self.rows_left = 5;
        Ok(())
    }

    async fn next_row(&mut self) -> Result<Option<Row>, DbError> {
        self.check_up().await?;
        if self.rows_left == 0 {
            return Ok(None);
        }
        self.rows_left -= 1;
        Ok(Some(vec![
            Value::Text(self.host.clone()),
            Value::Int(self.rows_left as i64),
        ]))
    }

    async fn ping(&mut self) -> Result<(), DbError> {
        self.check_up().await
    }
}

#[async_trait]
impl Connector for Cluster {
    async fn connect(
        &self,
        endpoint: &aegis::config::EndpointConfig,
    ) -> Result<Box<dyn RawConnection>, DbError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let mode = self
            .state
            .modes
            .lock()
            .get(&endpoint.host)
            .copied()
            .unwrap_or(Mode::Up);
        match mode {
            Mode::Up => Ok(Box::new(ClusterConn {
                state: Arc::clone(&self.state),
                host: endpoint.host.clone(),
                rows_left: 0,
            })),
            Mode::Down => Err(DbError::connection("connection refused")),
            Mode::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Config suitable for paused-clock tests: short timeouts, probing off
/// unless the scenario turns it on.
pub fn test_config(hosts: &[&str]) -> Config {
    let toml = format!(
        r#"
{}

[pool]
max_idle = 4

[acquire]
timeout_ms = 200

[execution]
query_timeout_ms = 500
analytical_timeout_ms = 2000

[probe]
enabled = false
interval_ms = 1000
timeout_ms = 300
reeligible_after_ms = 5000

[breaker]
failure_threshold = 3
half_open_after_ms = 2000

[retry]
max_attempts = 3
initial_backoff_ms = 10
max_backoff_ms = 50
"#,
        hosts
            .iter()
            .enumerate()
            .map(|(i, host)| format!(
                "[[endpoints]]\nhost = \"{host}\"\nport = 6432\npriority = {i}\n"
            ))
            .collect::<Vec<_>>()
            .join("\n")
    );
    toml::from_str(&toml).expect("test config parses")
}

pub fn client(cluster: &Arc<Cluster>, hosts: &[&str]) -> DbClient {
    init_tracing();
    DbClient::new(test_config(hosts), cluster.clone()).expect("client builds")
}

/// Which host answered, per the fake's single result column.
pub fn served_by(result: &QueryResult) -> String {
    match &result.rows[0][0] {
        Value::Text(host) => host.clone(),
        other => panic!("unexpected value {other:?}"),
    }
}
