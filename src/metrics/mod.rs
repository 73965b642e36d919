//! Prometheus metrics for the resilience core.
//!
//! The registry is exposed so the embedding process can mount it on
//! whatever scrape surface it runs.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    // Router metrics
    /// Physical acquisition attempts (post skip logic)
    pub acquire_attempts_total: IntCounter,
    /// Passes that found no acquirable endpoint
    pub acquire_unavailable_total: IntCounter,
    /// Acquisitions that succeeded on a non-first candidate
    pub failovers_total: IntCounter,

    // Circuit breaker metrics
    /// Breaker transitions by resulting state
    pub breaker_transitions_total: IntCounterVec,

    // Retry metrics
    /// Backoff waits performed
    pub retries_total: IntCounter,

    // Health probe metrics
    /// Probe outcomes by result
    pub probes_total: IntCounterVec,

    // Query metrics
    /// Query outcomes by result
    pub queries_total: IntCounterVec,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let acquire_attempts_total = IntCounter::new(
            "aegis_acquire_attempts_total",
            "Physical connection acquisition attempts",
        )
        .unwrap();

        let acquire_unavailable_total = IntCounter::new(
            "aegis_acquire_unavailable_total",
            "Failover passes that exhausted all endpoints",
        )
        .unwrap();

        let failovers_total = IntCounter::new(
            "aegis_failovers_total",
            "Acquisitions served by a non-preferred endpoint",
        )
        .unwrap();

        let breaker_transitions_total = IntCounterVec::new(
            Opts::new(
                "aegis_breaker_transitions_total",
                "Circuit breaker transitions by resulting state",
            ),
            &["state"],
        )
        .unwrap();

        let retries_total =
            IntCounter::new("aegis_retries_total", "Backoff waits performed").unwrap();

        let probes_total = IntCounterVec::new(
            Opts::new("aegis_probes_total", "Health probe outcomes"),
            &["result"],
        )
        .unwrap();

        let queries_total = IntCounterVec::new(
            Opts::new("aegis_queries_total", "Query outcomes"),
            &["outcome"],
        )
        .unwrap();

        registry
            .register(Box::new(acquire_attempts_total.clone()))
            .unwrap();
        registry
            .register(Box::new(acquire_unavailable_total.clone()))
            .unwrap();
        registry.register(Box::new(failovers_total.clone())).unwrap();
        registry
            .register(Box::new(breaker_transitions_total.clone()))
            .unwrap();
        registry.register(Box::new(retries_total.clone())).unwrap();
        registry.register(Box::new(probes_total.clone())).unwrap();
        registry.register(Box::new(queries_total.clone())).unwrap();

        Self {
            registry,
            acquire_attempts_total,
            acquire_unavailable_total,
            failovers_total,
            breaker_transitions_total,
            retries_total,
            probes_total,
            queries_total,
        }
    }
}
