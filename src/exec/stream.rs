//! Incremental row delivery over a held connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::circuit::CircuitBreaker;
use crate::endpoint::EndpointId;
use crate::error::{DbError, ErrorKind, TimeoutPhase};
use crate::health::HealthTracker;
use crate::pool::ConnectionGuard;
use crate::statement::Row;

/// Rows from a streaming query, pulled one at a time.
///
/// The stream owns its connection; dropping the stream returns the
/// connection to the pool if the stream ended cleanly and discards it
/// otherwise (a half-read result set leaves the wire in an unknown state).
pub struct RowStream {
    guard: ConnectionGuard,
    endpoint: EndpointId,
    health: Arc<HealthTracker>,
    breaker: Arc<CircuitBreaker>,
    row_timeout: Duration,
    done: bool,
}

impl RowStream {
    pub(super) fn new(
        guard: ConnectionGuard,
        endpoint: EndpointId,
        health: Arc<HealthTracker>,
        breaker: Arc<CircuitBreaker>,
        row_timeout: Duration,
    ) -> Self {
        Self {
            guard,
            endpoint,
            health,
            breaker,
            row_timeout,
            done: false,
        }
    }

    /// Endpoint serving this stream.
    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Fetch the next row. `None` means the result set is exhausted.
    ///
    /// The first error ends the stream; there is no mid-stream failover
    /// because replaying a partially consumed query could duplicate work.
    pub async fn next(&mut self) -> Option<Result<Row, DbError>> {
        if self.done {
            return None;
        }

        let result = match timeout(self.row_timeout, self.guard.next_row()).await {
            Ok(r) => r,
            Err(_) => Err(DbError::timeout(TimeoutPhase::Execute, self.row_timeout)),
        };

        match result {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                self.health.record_success(&self.endpoint);
                None
            }
            Err(e) => {
                self.done = true;
                if e.kind() != ErrorKind::Statement {
                    self.guard.discard();
                    if e.counts_against_breaker() {
                        self.health.record_failure(&self.endpoint);
                        self.breaker.on_result(&self.endpoint, false);
                    }
                }
                Some(Err(e))
            }
        }
    }

    /// Collect all remaining rows, failing on the first stream error.
    pub async fn collect(mut self) -> Result<Vec<Row>, DbError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        // Abandoned before exhaustion: the connection still carries
        // unread rows and must not be reused.
        if !self.done {
            self.guard.discard();
        }
    }
}
