use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BreakerConfig;
use crate::endpoint::EndpointId;
use crate::metrics::metrics;

/// Per-endpoint breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Traffic flows normally
    Closed,
    /// Endpoint is excluded; no attempts until the cooldown elapses
    Open,
    /// Cooldown elapsed; exactly one trial operation is admitted
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Guards the single half-open trial under concurrent callers
    trial_in_flight: bool,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// Consecutive-failure circuit breaker, one state machine per endpoint.
///
/// Each endpoint's core sits behind its own mutex; unrelated endpoints
/// never contend.
pub struct CircuitBreaker {
    cores: DashMap<EndpointId, Mutex<BreakerCore>>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(endpoints: impl IntoIterator<Item = EndpointId>, config: BreakerConfig) -> Self {
        let cores = DashMap::new();
        for id in endpoints {
            cores.insert(id, Mutex::new(BreakerCore::new()));
        }
        Self { cores, config }
    }

    /// Whether the endpoint may be attempted right now.
    ///
    /// Returns false while Open and inside the cooldown. Once the cooldown
    /// elapses the breaker moves to HalfOpen and admits exactly one trial;
    /// concurrent callers see false until that trial reports a result.
    pub fn allow(&self, id: &EndpointId) -> bool {
        let entry = self
            .cores
            .entry(id.clone())
            .or_insert_with(|| Mutex::new(BreakerCore::new()));
        let mut core = entry.lock();

        match core.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = core
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or_default();
                if elapsed >= self.config.half_open_after() {
                    core.state = CircuitState::HalfOpen;
                    core.trial_in_flight = true;
                    metrics()
                        .breaker_transitions_total
                        .with_label_values(&["half_open"])
                        .inc();
                    info!(endpoint = %id, "Circuit half-open, admitting trial");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if core.trial_in_flight {
                    false
                } else {
                    core.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Drive the transition table with an operation outcome.
    pub fn on_result(&self, id: &EndpointId, success: bool) {
        let entry = self
            .cores
            .entry(id.clone())
            .or_insert_with(|| Mutex::new(BreakerCore::new()));
        let mut core = entry.lock();

        if success {
            if core.state != CircuitState::Closed {
                metrics()
                    .breaker_transitions_total
                    .with_label_values(&["closed"])
                    .inc();
                info!(endpoint = %id, "Circuit closed");
            }
            core.state = CircuitState::Closed;
            core.consecutive_failures = 0;
            core.opened_at = None;
            core.trial_in_flight = false;
            return;
        }

        core.consecutive_failures += 1;
        match core.state {
            CircuitState::HalfOpen => {
                // Trial failed; back to Open with a fresh cooldown
                core.state = CircuitState::Open;
                core.opened_at = Some(Instant::now());
                core.trial_in_flight = false;
                metrics()
                    .breaker_transitions_total
                    .with_label_values(&["open"])
                    .inc();
                warn!(endpoint = %id, "Circuit reopened after failed trial");
            }
            CircuitState::Closed => {
                if core.consecutive_failures >= self.config.failure_threshold {
                    core.state = CircuitState::Open;
                    core.opened_at = Some(Instant::now());
                    metrics()
                        .breaker_transitions_total
                        .with_label_values(&["open"])
                        .inc();
                    warn!(
                        endpoint = %id,
                        failures = core.consecutive_failures,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::Open => {
                // Straggler failure from an operation admitted before the
                // breaker opened; the cooldown clock is not pushed out.
                debug!(endpoint = %id, "Failure while circuit already open");
            }
        }
    }

    /// Hand back an admitted half-open trial that was abandoned without an
    /// outcome, so the next caller can be admitted instead.
    pub fn release_trial(&self, id: &EndpointId) {
        if let Some(core) = self.cores.get(id) {
            let mut core = core.lock();
            if core.state == CircuitState::HalfOpen {
                core.trial_in_flight = false;
            }
        }
    }

    pub fn state(&self, id: &EndpointId) -> CircuitState {
        self.cores
            .get(id)
            .map(|core| core.lock().state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn consecutive_failures(&self, id: &EndpointId) -> u32 {
        self.cores
            .get(id)
            .map(|core| core.lock().consecutive_failures)
            .unwrap_or(0)
    }
}
