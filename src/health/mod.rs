//! Endpoint health tracking.
//!
//! This module provides:
//! - Per-endpoint health records fed by active probes and live traffic
//! - Grace-period re-eligibility so a stale unhealthy endpoint gets another
//!   live-traffic attempt even if no probe has succeeded yet
//! - One background probe task per endpoint, isolated so a dead endpoint
//!   cannot stall checks on the others

mod probe;
mod state;
mod tracker;

pub use probe::Prober;
pub use state::HealthRecord;
pub use tracker::{HealthTracker, ProbeMode};
