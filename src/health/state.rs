use std::time::Duration;

use tokio::time::Instant;

/// Health state for a single endpoint.
///
/// A record starts healthy: an endpoint is innocent until a probe or a
/// live-traffic failure says otherwise.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub healthy: bool,
    pub last_checked: Instant,
}

impl HealthRecord {
    pub fn new() -> Self {
        Self {
            healthy: true,
            last_checked: Instant::now(),
        }
    }

    /// Record a successful check or live operation.
    ///
    /// Returns true if the status changed.
    pub fn record_success(&mut self) -> bool {
        self.last_checked = Instant::now();
        let changed = !self.healthy;
        self.healthy = true;
        changed
    }

    /// Record a failed check or live operation.
    ///
    /// Returns true if the status changed.
    pub fn record_failure(&mut self) -> bool {
        self.last_checked = Instant::now();
        let changed = self.healthy;
        self.healthy = false;
        changed
    }

    /// Whether the endpoint may be attempted.
    ///
    /// An unhealthy record goes stale after `grace`: the endpoint becomes
    /// eligible for a live-traffic attempt again, so a misreported endpoint
    /// is never excluded forever even if probing is down.
    pub fn is_eligible(&self, grace: Duration) -> bool {
        self.healthy || self.last_checked.elapsed() > grace
    }
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}
