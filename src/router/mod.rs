//! Connection routing and failover.
//!
//! `acquire` makes exactly one pass over the endpoint list per call, so the
//! caller's total latency stays bounded by `N * acquire_timeout`; anything
//! beyond that is the retry policy's decision, layered above.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::circuit::CircuitBreaker;
use crate::endpoint::{EndpointId, EndpointRegistry};
use crate::error::{DbError, TimeoutPhase};
use crate::health::HealthTracker;
use crate::metrics::metrics;
use crate::pool::ConnectionGuard;

pub struct Router {
    registry: Arc<EndpointRegistry>,
    health: Arc<HealthTracker>,
    breaker: Arc<CircuitBreaker>,
    /// Rotating starting point; persists across calls to spread load
    /// instead of hammering the first endpoint. Interleaved updates under
    /// contention are fine: distribution is approximate by design.
    cursor: AtomicUsize,
    acquire_timeout: Duration,
    shutdown: CancellationToken,
}

impl Router {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        health: Arc<HealthTracker>,
        breaker: Arc<CircuitBreaker>,
        acquire_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            health,
            breaker,
            cursor: AtomicUsize::new(0),
            acquire_timeout,
            shutdown,
        }
    }

    /// Acquire a connection from the first eligible endpoint.
    ///
    /// Starting at the cursor, each endpoint gets at most one bounded
    /// acquisition attempt; ineligible (unhealthy) and breaker-excluded
    /// endpoints are skipped without a network attempt. Failures are
    /// reported into the health tracker and breaker as they happen.
    pub async fn acquire(&self) -> Result<(ConnectionGuard, EndpointId), DbError> {
        let endpoints = self.registry.list();
        let n = endpoints.len();
        if n == 0 {
            return Err(DbError::Unavailable { last: None });
        }

        let start = self.cursor.load(Ordering::Relaxed);
        let mut last_error: Option<DbError> = None;

        for offset in 0..n {
            let idx = (start + offset) % n;
            let endpoint = &endpoints[idx];

            if !self.health.is_eligible(&endpoint.id) {
                debug!(endpoint = %endpoint.id, "Skipping ineligible endpoint");
                continue;
            }
            if !self.breaker.allow(&endpoint.id) {
                debug!(endpoint = %endpoint.id, "Skipping endpoint with open circuit");
                continue;
            }

            metrics().acquire_attempts_total.inc();
            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    // An admitted half-open trial must not stay reserved
                    // for an attempt that never completes.
                    self.breaker.release_trial(&endpoint.id);
                    return Err(DbError::Cancelled);
                }
                result = timeout(self.acquire_timeout, endpoint.pool.get()) => result,
            };

            match attempt {
                Ok(Ok(guard)) => {
                    self.health.record_success(&endpoint.id);
                    self.breaker.on_result(&endpoint.id, true);
                    self.cursor.store((idx + 1) % n, Ordering::Relaxed);
                    if offset > 0 {
                        metrics().failovers_total.inc();
                    }
                    return Ok((guard, endpoint.id.clone()));
                }
                Ok(Err(e)) => {
                    warn!(endpoint = %endpoint.id, error = %e, "Acquisition failed, failing over");
                    self.health.record_failure(&endpoint.id);
                    self.breaker.on_result(&endpoint.id, false);
                    last_error = Some(e);
                }
                Err(_) => {
                    let e = DbError::timeout(TimeoutPhase::Acquire, self.acquire_timeout);
                    warn!(endpoint = %endpoint.id, error = %e, "Acquisition timed out, failing over");
                    self.health.record_failure(&endpoint.id);
                    self.breaker.on_result(&endpoint.id, false);
                    last_error = Some(e);
                }
            }
        }

        metrics().acquire_unavailable_total.inc();
        Err(DbError::Unavailable {
            last: last_error.map(Box::new),
        })
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}
