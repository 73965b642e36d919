use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{EndpointConfig, ProbeConfig};
use crate::endpoint::{Endpoint, EndpointId, EndpointRegistry};
use crate::error::DbError;
use crate::metrics::metrics;
use crate::pool::{Connector, RawConnection};

use super::tracker::HealthTracker;

/// Background prober: one long-running task per endpoint.
///
/// Each task keeps its own cached connection so probing does not churn the
/// request-path pool, and reconnects when the cached connection dies.
/// Probe failures are swallowed locally (logged, state updated); they never
/// propagate to request-path callers.
pub struct Prober {
    registry: Arc<EndpointRegistry>,
    tracker: Arc<HealthTracker>,
    connector: Arc<dyn Connector>,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        tracker: Arc<HealthTracker>,
        connector: Arc<dyn Connector>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            connector,
            config,
        }
    }

    /// Spawn one probe task per endpoint. Tasks stop when `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        if !self.config.enabled {
            info!("Active health probing disabled");
            return Vec::new();
        }

        let interval = self.config.interval();
        let check_timeout = self.config.timeout();

        self.registry
            .list()
            .iter()
            .map(|endpoint| {
                let endpoint = Arc::clone(endpoint);
                let tracker = Arc::clone(&self.tracker);
                let connector = Arc::clone(&self.connector);
                let cancel = shutdown.clone();
                tokio::spawn(async move {
                    probe_loop(endpoint, tracker, connector, interval, check_timeout, cancel)
                        .await;
                })
            })
            .collect()
    }
}

async fn probe_loop(
    endpoint: Arc<Endpoint>,
    tracker: Arc<HealthTracker>,
    connector: Arc<dyn Connector>,
    interval: Duration,
    check_timeout: Duration,
    cancel: CancellationToken,
) {
    // Random initial delay staggers probes across endpoints
    let stagger = rand::thread_rng().gen_range(0..interval.as_millis().max(1) as u64);
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(endpoint = %endpoint.id, "Probe task cancelled");
            return;
        }
        _ = tokio::time::sleep(Duration::from_millis(stagger)) => {}
    }

    // Cached connection, reused across checks
    let mut conn: Option<Box<dyn RawConnection>> = None;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(endpoint = %endpoint.id, "Probe task cancelled");
                break;
            }
            _ = ticker.tick() => {
                check_once(&endpoint.id, &endpoint.config, &tracker, &connector, &mut conn, check_timeout).await;
            }
        }
    }
}

async fn check_once(
    id: &EndpointId,
    config: &EndpointConfig,
    tracker: &HealthTracker,
    connector: &Arc<dyn Connector>,
    conn: &mut Option<Box<dyn RawConnection>>,
    check_timeout: Duration,
) {
    let result = tokio::time::timeout(check_timeout, check_with_conn(config, connector, conn)).await;

    match result {
        Ok(Ok(())) => {
            metrics().probes_total.with_label_values(&["success"]).inc();
            tracker.record_success(id);
            debug!(endpoint = %id, "Probe passed");
        }
        Ok(Err(e)) => {
            metrics().probes_total.with_label_values(&["failure"]).inc();
            *conn = None;
            tracker.record_failure(id);
            debug!(endpoint = %id, error = %e, "Probe failed");
        }
        Err(_) => {
            metrics().probes_total.with_label_values(&["timeout"]).inc();
            *conn = None;
            tracker.record_failure(id);
            debug!(endpoint = %id, "Probe timed out");
        }
    }
}

/// Ping through the cached connection, reconnecting once if it is dead.
async fn check_with_conn(
    config: &EndpointConfig,
    connector: &Arc<dyn Connector>,
    conn: &mut Option<Box<dyn RawConnection>>,
) -> Result<(), DbError> {
    if let Some(cached) = conn.as_mut() {
        match cached.ping().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!(endpoint = %config.addr(), error = %e, "Cached probe connection failed, reconnecting");
                *conn = None;
            }
        }
    }

    let mut fresh = connector.connect(config).await?;
    fresh.ping().await?;
    *conn = Some(fresh);
    Ok(())
}
