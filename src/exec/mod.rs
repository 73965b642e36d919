//! Top-level client: wires the registry, health tracker, circuit breaker,
//! router, and retry policy together and exposes query execution.
//!
//! Each `execute_query` call is independent: the acquisition timeout bounds how
//! long we wait for a connection, the execution timeout (picked by query
//! class) bounds how long a statement may run once a connection is held.

mod stream;
mod transaction;

pub use stream::RowStream;
pub use transaction::Transaction;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::circuit::{CircuitBreaker, CircuitState};
use crate::config::{Config, ConfigError};
use crate::endpoint::{EndpointId, EndpointRegistry};
use crate::error::{DbError, ErrorKind, TimeoutPhase};
use crate::health::{HealthTracker, ProbeMode, Prober};
use crate::metrics::metrics;
use crate::pool::{ConnectionGuard, Connector};
use crate::retry::{RetryError, RetryPolicy};
use crate::router::Router;
use crate::statement::{QueryClass, QueryResult, Statement};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Non-retryable failure, surfaced unchanged.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Retryable failures kept happening until the budget was spent.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: DbError,
    },
}

impl From<RetryError> for ExecError {
    fn from(e: RetryError) -> Self {
        match e {
            RetryError::Fatal(e) => ExecError::Db(e),
            RetryError::Exhausted { attempts, source } => {
                ExecError::RetriesExhausted { attempts, source }
            }
        }
    }
}

/// Point-in-time view of one endpoint, for operators.
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub endpoint: EndpointId,
    pub healthy: bool,
    pub circuit: CircuitState,
    pub consecutive_failures: u32,
    pub idle_connections: usize,
}

pub struct DbClient {
    router: Router,
    retry: RetryPolicy,
    query_timeout: Duration,
    analytical_timeout: Duration,
    shutdown: CancellationToken,
    probe_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DbClient {
    /// Build a client from configuration and a connector.
    ///
    /// When probing is enabled this spawns one background probe task per
    /// endpoint; [`DbClient::shutdown`] stops them.
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Result<Self, ConfigError> {
        let registry = Arc::new(EndpointRegistry::from_config(
            &config.endpoints,
            &config.pool,
            Arc::clone(&connector),
        )?);
        let ids: Vec<EndpointId> = registry.list().iter().map(|e| e.id.clone()).collect();

        let mode = if config.probe.enabled {
            ProbeMode::Active
        } else {
            ProbeMode::PassiveOnly
        };
        let health = Arc::new(HealthTracker::new(
            ids.iter().cloned(),
            config.probe.reeligible_after(),
            mode,
        ));
        let breaker = Arc::new(CircuitBreaker::new(ids, config.breaker.clone()));

        let shutdown = CancellationToken::new();
        let prober = Prober::new(
            Arc::clone(&registry),
            Arc::clone(&health),
            connector,
            config.probe.clone(),
        );
        let probe_handles = prober.spawn(shutdown.clone());

        let router = Router::new(
            registry,
            health,
            breaker,
            config.acquire.timeout(),
            shutdown.clone(),
        );
        let retry = RetryPolicy::new(config.retry.clone(), shutdown.clone());

        info!(
            endpoints = config.endpoints.len(),
            probing = config.probe.enabled,
            "Database client initialized"
        );

        Ok(Self {
            router,
            retry,
            query_timeout: config.execution.query_timeout(),
            analytical_timeout: config.execution.analytical_timeout(),
            shutdown,
            probe_handles: Mutex::new(probe_handles),
        })
    }

    /// Run a statement to completion, with failover and retry.
    pub async fn execute_query(&self, statement: &Statement) -> Result<QueryResult, ExecError> {
        let result = self
            .retry
            .run(|_attempt| self.run_once(statement).boxed())
            .await;
        Ok(result?)
    }

    /// Run a statement and return rows incrementally.
    ///
    /// Retry covers acquisition and opening the stream; once rows are
    /// flowing, a failure ends the stream (re-running a partially consumed
    /// query could duplicate side effects).
    pub async fn stream_query(&self, statement: &Statement) -> Result<RowStream, ExecError> {
        let limit = self.limit_for(statement.class);
        let (guard, endpoint) = self
            .retry
            .run(|_attempt| self.open_stream_once(statement, limit).boxed())
            .await?;
        Ok(RowStream::new(
            guard,
            endpoint,
            Arc::clone(self.router.health()),
            Arc::clone(self.router.breaker()),
            limit,
        ))
    }

    /// Open a transaction pinned to a single endpoint.
    ///
    /// Acquisition and the opening `BEGIN` are retried; everything after
    /// that runs without failover, because the endpoint holds transaction
    /// state that no other endpoint has.
    pub async fn begin_transaction(&self) -> Result<Transaction, ExecError> {
        let (guard, endpoint) = self
            .retry
            .run(|_attempt| self.begin_once().boxed())
            .await?;
        Ok(Transaction::new(
            guard,
            endpoint,
            Arc::clone(self.router.health()),
            Arc::clone(self.router.breaker()),
            self.query_timeout,
            self.analytical_timeout,
        ))
    }

    /// Per-endpoint health, circuit, and pool state.
    pub fn health_snapshot(&self) -> Vec<EndpointSnapshot> {
        let health = self.router.health();
        let breaker = self.router.breaker();
        self.router
            .registry()
            .list()
            .iter()
            .map(|endpoint| EndpointSnapshot {
                endpoint: endpoint.id.clone(),
                healthy: health.is_healthy(&endpoint.id),
                circuit: breaker.state(&endpoint.id),
                consecutive_failures: breaker.consecutive_failures(&endpoint.id),
                idle_connections: endpoint.pool.idle_count(),
            })
            .collect()
    }

    /// Cancel in-flight work, stop probe tasks, and drop idle connections.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self.probe_handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        for endpoint in self.router.registry().list() {
            endpoint.pool.close_all();
        }
        info!("Database client shut down");
    }

    fn limit_for(&self, class: QueryClass) -> Duration {
        match class {
            QueryClass::Normal => self.query_timeout,
            QueryClass::Analytical => self.analytical_timeout,
        }
    }

    /// One acquire-and-execute attempt against whichever endpoint the
    /// router picks.
    async fn run_once(&self, statement: &Statement) -> Result<QueryResult, DbError> {
        let (mut guard, endpoint) = self.router.acquire().await?;
        let limit = self.limit_for(statement.class);

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => Err(DbError::Cancelled),
            outcome = timeout(limit, guard.execute(statement)) => match outcome {
                Ok(r) => r,
                Err(_) => Err(DbError::timeout(TimeoutPhase::Execute, limit)),
            },
        };

        match &result {
            Ok(_) => {
                self.router.health().record_success(&endpoint);
                self.router.breaker().on_result(&endpoint, true);
                metrics().queries_total.with_label_values(&["success"]).inc();
            }
            Err(e) if e.kind() == ErrorKind::Statement => {
                // The endpoint answered; the connection is fine and goes
                // back to the pool on drop.
                metrics()
                    .queries_total
                    .with_label_values(&["statement_error"])
                    .inc();
            }
            Err(e) => {
                // Server-side state for a timed-out or interrupted statement
                // is unknown; never reuse the connection.
                guard.discard();
                if e.counts_against_breaker() {
                    warn!(endpoint = %endpoint, error = %e, "Query failed on endpoint");
                    self.router.health().record_failure(&endpoint);
                    self.router.breaker().on_result(&endpoint, false);
                }
                metrics().queries_total.with_label_values(&["failure"]).inc();
            }
        }

        result
    }

    async fn open_stream_once(
        &self,
        statement: &Statement,
        limit: Duration,
    ) -> Result<(ConnectionGuard, EndpointId), DbError> {
        let (mut guard, endpoint) = self.router.acquire().await?;

        let opened = tokio::select! {
            _ = self.shutdown.cancelled() => Err(DbError::Cancelled),
            outcome = timeout(limit, guard.open_stream(statement)) => match outcome {
                Ok(r) => r,
                Err(_) => Err(DbError::timeout(TimeoutPhase::Execute, limit)),
            },
        };

        match opened {
            Ok(()) => {
                self.router.health().record_success(&endpoint);
                self.router.breaker().on_result(&endpoint, true);
                Ok((guard, endpoint))
            }
            Err(e) => {
                self.fail_attempt(&mut guard, &endpoint, &e);
                Err(e)
            }
        }
    }

    async fn begin_once(&self) -> Result<(ConnectionGuard, EndpointId), DbError> {
        let (mut guard, endpoint) = self.router.acquire().await?;
        let begin = Statement::new("BEGIN");

        let opened = tokio::select! {
            _ = self.shutdown.cancelled() => Err(DbError::Cancelled),
            outcome = timeout(self.query_timeout, guard.execute(&begin)) => match outcome {
                Ok(r) => r.map(|_| ()),
                Err(_) => Err(DbError::timeout(TimeoutPhase::Execute, self.query_timeout)),
            },
        };

        match opened {
            Ok(()) => {
                self.router.health().record_success(&endpoint);
                self.router.breaker().on_result(&endpoint, true);
                Ok((guard, endpoint))
            }
            Err(e) => {
                self.fail_attempt(&mut guard, &endpoint, &e);
                Err(e)
            }
        }
    }

    fn fail_attempt(&self, guard: &mut ConnectionGuard, endpoint: &EndpointId, e: &DbError) {
        if e.kind() == ErrorKind::Statement {
            return;
        }
        guard.discard();
        if e.counts_against_breaker() {
            warn!(endpoint = %endpoint, error = %e, "Operation failed on endpoint");
            self.router.health().record_failure(endpoint);
            self.router.breaker().on_result(endpoint, false);
        }
    }
}
