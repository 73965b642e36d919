//! Transactions pinned to a single endpoint.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use crate::circuit::CircuitBreaker;
use crate::endpoint::EndpointId;
use crate::error::{DbError, ErrorKind, TimeoutPhase};
use crate::health::HealthTracker;
use crate::pool::ConnectionGuard;
use crate::statement::{QueryClass, QueryResult, Statement};

/// An open transaction holding one connection for its whole lifetime.
///
/// No statement inside a transaction fails over: the endpoint holds
/// uncommitted state that exists nowhere else. A connection-level failure
/// aborts the transaction; the caller starts over via `DbClient::begin_transaction`.
pub struct Transaction {
    guard: ConnectionGuard,
    endpoint: EndpointId,
    health: Arc<HealthTracker>,
    breaker: Arc<CircuitBreaker>,
    query_timeout: Duration,
    analytical_timeout: Duration,
    done: bool,
}

impl Transaction {
    pub(super) fn new(
        guard: ConnectionGuard,
        endpoint: EndpointId,
        health: Arc<HealthTracker>,
        breaker: Arc<CircuitBreaker>,
        query_timeout: Duration,
        analytical_timeout: Duration,
    ) -> Self {
        Self {
            guard,
            endpoint,
            health,
            breaker,
            query_timeout,
            analytical_timeout,
            done: false,
        }
    }

    fn limit_for(&self, class: QueryClass) -> Duration {
        match class {
            QueryClass::Normal => self.query_timeout,
            QueryClass::Analytical => self.analytical_timeout,
        }
    }

    /// Endpoint this transaction is pinned to.
    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Run a statement inside the transaction.
    ///
    /// A statement error leaves the transaction open; anything else aborts
    /// it and discards the connection.
    pub async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, DbError> {
        if self.done {
            return Err(DbError::connection("transaction already completed"));
        }

        let limit = self.limit_for(statement.class);
        let result = match timeout(limit, self.guard.execute(statement)).await {
            Ok(r) => r,
            Err(_) => Err(DbError::timeout(TimeoutPhase::Execute, limit)),
        };

        if let Err(e) = &result {
            if e.kind() != ErrorKind::Statement {
                warn!(endpoint = %self.endpoint, error = %e, "Transaction aborted");
                self.abort(e);
            }
        }
        result
    }

    /// Commit and release the connection.
    pub async fn commit(mut self) -> Result<(), DbError> {
        self.finish("COMMIT").await
    }

    /// Roll back and release the connection.
    pub async fn rollback(mut self) -> Result<(), DbError> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, sql: &str) -> Result<(), DbError> {
        if self.done {
            return Err(DbError::connection("transaction already completed"));
        }
        self.done = true;

        let statement = Statement::new(sql);
        let result = match timeout(self.query_timeout, self.guard.execute(&statement)).await {
            Ok(r) => r.map(|_| ()),
            Err(_) => Err(DbError::timeout(TimeoutPhase::Execute, self.query_timeout)),
        };

        match &result {
            Ok(()) => {
                self.health.record_success(&self.endpoint);
                self.breaker.on_result(&self.endpoint, true);
            }
            Err(e) => {
                // Whether the server applied the commit is unknown.
                self.guard.discard();
                if e.counts_against_breaker() {
                    self.health.record_failure(&self.endpoint);
                    self.breaker.on_result(&self.endpoint, false);
                }
            }
        }
        result
    }

    fn abort(&mut self, e: &DbError) {
        self.done = true;
        self.guard.discard();
        if e.counts_against_breaker() {
            self.health.record_failure(&self.endpoint);
            self.breaker.on_result(&self.endpoint, false);
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // Dropped without commit or rollback: the server side still holds
        // an open transaction, so the connection cannot be reused.
        if !self.done {
            warn!(endpoint = %self.endpoint, "Transaction dropped without commit or rollback");
            self.guard.discard();
        }
    }
}
