//! Resilient routing layer over interchangeable database endpoints.
//!
//! The database sits behind a set of equivalent endpoints (typically
//! connection-pooling proxies); any of them can serve any query, and any
//! of them can die without warning. This crate keeps query traffic flowing
//! through whichever endpoints currently work:
//!
//! - [`endpoint`]: the registry of configured endpoints, each with its own
//!   idle connection pool
//! - [`health`]: passive failure tracking plus optional background probing
//! - [`circuit`]: a per-endpoint circuit breaker that stops hammering a
//!   dead endpoint
//! - [`router`]: one bounded failover pass across eligible endpoints
//! - [`retry`]: jittered exponential backoff around the whole attempt
//! - [`exec`]: the [`DbClient`] entry point tying it all together
//!
//! The actual wire protocol is pluggable through [`pool::Connector`]; this
//! crate owns everything between "run this statement" and "on which
//! connection, to which endpoint, with what deadline".

pub mod circuit;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod exec;
pub mod health;
pub mod metrics;
pub mod pool;
pub mod retry;
pub mod router;
pub mod statement;

pub use circuit::{CircuitBreaker, CircuitState};
pub use config::{load_config, Config, ConfigError};
pub use endpoint::{Endpoint, EndpointId, EndpointRegistry};
pub use error::{DbError, ErrorKind, TimeoutPhase};
pub use exec::{DbClient, EndpointSnapshot, ExecError, RowStream, Transaction};
pub use health::{HealthTracker, ProbeMode, Prober};
pub use pool::{ConnectionGuard, Connector, RawConnection};
pub use retry::{RetryError, RetryPolicy};
pub use router::Router;
pub use statement::{QueryClass, QueryResult, Row, Statement, Value};
