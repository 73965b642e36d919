use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::endpoint::EndpointId;

use super::state::HealthRecord;

/// How health state is fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Background probe tasks plus passive live-traffic signals.
    Active,
    /// No background tasks possible (short-lived host environment);
    /// everything is eligible and the circuit breaker alone excludes
    /// endpoints.
    PassiveOnly,
}

/// Shared per-endpoint health state.
///
/// DashMap keeps updates fine-grained per endpoint; there is no global
/// lock across endpoints.
pub struct HealthTracker {
    records: DashMap<EndpointId, HealthRecord>,
    grace: Duration,
    mode: ProbeMode,
}

impl HealthTracker {
    pub fn new(endpoints: impl IntoIterator<Item = EndpointId>, grace: Duration, mode: ProbeMode) -> Self {
        let records = DashMap::new();
        for id in endpoints {
            records.insert(id, HealthRecord::new());
        }
        Self {
            records,
            grace,
            mode,
        }
    }

    pub fn mode(&self) -> ProbeMode {
        self.mode
    }

    pub fn record_success(&self, id: &EndpointId) {
        let mut record = self.records.entry(id.clone()).or_default();
        if record.record_success() {
            info!(endpoint = %id, "Endpoint recovered");
        }
    }

    pub fn record_failure(&self, id: &EndpointId) {
        let mut record = self.records.entry(id.clone()).or_default();
        if record.record_failure() {
            warn!(endpoint = %id, "Endpoint marked unhealthy");
        }
    }

    /// Whether the endpoint may be attempted for live traffic.
    pub fn is_eligible(&self, id: &EndpointId) -> bool {
        if self.mode == ProbeMode::PassiveOnly {
            return true;
        }
        self.records
            .get(id)
            .map(|r| r.is_eligible(self.grace))
            .unwrap_or(true)
    }

    pub fn is_healthy(&self, id: &EndpointId) -> bool {
        self.records.get(id).map(|r| r.healthy).unwrap_or(true)
    }

    /// Current health of every tracked endpoint.
    pub fn snapshot(&self) -> Vec<(EndpointId, bool)> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().healthy))
            .collect()
    }
}
