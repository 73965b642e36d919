use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Candidate endpoints, usually connection-pooling proxies in front of
    /// the real database. Lower priority = preferred.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    /// Per-endpoint idle pool tuning
    #[serde(default)]
    pub pool: PoolConfig,
    /// Connection acquisition bounds
    #[serde(default)]
    pub acquire: AcquireConfig,
    /// Statement execution bounds
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Background health probing
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Circuit breaker tuning
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Retry policy tuning
    #[serde(default)]
    pub retry: RetryConfig,
}

// ============================================================================
// Endpoint Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Hostname or IP of the endpoint (proxy)
    pub host: String,
    /// Port number
    pub port: u16,
    /// Failover priority; lower is preferred, ties keep config order
    #[serde(default)]
    pub priority: u32,
}

impl EndpointConfig {
    /// Get the address string (host:port)
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Pool Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of idle connections to keep per endpoint
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
    /// Maximum connection age before recycling (milliseconds)
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,
    /// Maximum idle time before closing (milliseconds)
    #[serde(default = "default_max_idle_time_ms")]
    pub max_idle_time_ms: u64,
}

fn default_max_idle() -> usize {
    10
}

fn default_max_age_ms() -> u64 {
    3_600_000 // 1 hour
}

fn default_max_idle_time_ms() -> u64 {
    300_000 // 5 minutes
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: default_max_idle(),
            max_age_ms: default_max_age_ms(),
            max_idle_time_ms: default_max_idle_time_ms(),
        }
    }
}

impl PoolConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn max_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_idle_time_ms)
    }
}

// ============================================================================
// Acquisition / Execution Timeouts
// ============================================================================

/// Bounds on getting a physical connection out of one endpoint's pool.
///
/// A hung proxy must not stall the whole request; after this timeout the
/// router treats the attempt as failed and moves to the next endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AcquireConfig {
    #[serde(default = "default_acquire_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl AcquireConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Bounds on running a single statement once a connection is held.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Timeout for normal statements (milliseconds)
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Timeout for statements marked analytical (milliseconds)
    #[serde(default = "default_analytical_timeout_ms")]
    pub analytical_timeout_ms: u64,
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_analytical_timeout_ms() -> u64 {
    120_000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            analytical_timeout_ms: default_analytical_timeout_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn analytical_timeout(&self) -> Duration {
        Duration::from_millis(self.analytical_timeout_ms)
    }
}

// ============================================================================
// Health Probe Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Whether active background probing is enabled. When disabled (e.g.
    /// short-lived execution environments), health tracking is passive and
    /// endpoint exclusion falls entirely to the circuit breaker.
    #[serde(default = "default_probe_enabled")]
    pub enabled: bool,
    /// Interval between probes (milliseconds)
    #[serde(default = "default_probe_interval_ms")]
    pub interval_ms: u64,
    /// Timeout for each probe (milliseconds)
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
    /// Grace period after which a stale unhealthy endpoint becomes eligible
    /// for a live-traffic attempt again (milliseconds)
    #[serde(default = "default_reeligible_after_ms")]
    pub reeligible_after_ms: u64,
}

fn default_probe_enabled() -> bool {
    true
}

fn default_probe_interval_ms() -> u64 {
    5000
}

fn default_probe_timeout_ms() -> u64 {
    3000
}

fn default_reeligible_after_ms() -> u64 {
    30_000
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: default_probe_enabled(),
            interval_ms: default_probe_interval_ms(),
            timeout_ms: default_probe_timeout_ms(),
            reeligible_after_ms: default_reeligible_after_ms(),
        }
    }
}

impl ProbeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reeligible_after(&self) -> Duration {
        Duration::from_millis(self.reeligible_after_ms)
    }
}

// ============================================================================
// Circuit Breaker Configuration
// ============================================================================

/// Consecutive-failure breaker tuning.
///
/// Consecutive-failure counting (rather than error-rate) reacts in O(1)
/// failures regardless of traffic volume, which matters with few endpoints
/// and low per-endpoint volume.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long an open breaker waits before admitting a half-open trial
    /// (milliseconds)
    #[serde(default = "default_half_open_after_ms")]
    pub half_open_after_ms: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_half_open_after_ms() -> u64 {
    5000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            half_open_after_ms: default_half_open_after_ms(),
        }
    }
}

impl BreakerConfig {
    pub fn half_open_after(&self) -> Duration {
        Duration::from_millis(self.half_open_after_ms)
    }
}

// ============================================================================
// Retry Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per logical operation
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay (milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling before jitter (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}
