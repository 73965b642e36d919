//! Endpoint registry: the configured set of candidate endpoints.
//!
//! Built once at startup and read-only afterwards. Each endpoint owns its
//! physical connection pool exclusively; callers reach the pool only
//! through the router.

use std::sync::Arc;

use crate::config::{ConfigError, EndpointConfig, PoolConfig};
use crate::pool::{Connector, EndpointPool};

/// Opaque endpoint identity (host:port).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId(pub String);

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One candidate endpoint with its pool.
pub struct Endpoint {
    pub id: EndpointId,
    pub config: EndpointConfig,
    pub pool: Arc<EndpointPool>,
}

impl Endpoint {
    pub fn priority(&self) -> u32 {
        self.config.priority
    }
}

/// Ordered, immutable set of endpoints.
pub struct EndpointRegistry {
    endpoints: Vec<Arc<Endpoint>>,
}

impl EndpointRegistry {
    /// Build the registry from configuration.
    ///
    /// Fails if no endpoints are configured or any address is malformed.
    /// Endpoints are ordered by ascending priority; ties keep their
    /// configuration order.
    pub fn from_config(
        configs: &[EndpointConfig],
        pool_config: &PoolConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ConfigError> {
        if configs.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        let mut seen = std::collections::HashSet::new();
        let mut endpoints = Vec::with_capacity(configs.len());
        for config in configs {
            validate_address(config)?;
            let addr = config.addr();
            if !seen.insert(addr.clone()) {
                return Err(ConfigError::InvalidEndpoint(format!(
                    "duplicate endpoint {addr}"
                )));
            }
            let pool = Arc::new(EndpointPool::new(
                config.clone(),
                pool_config.clone(),
                connector.clone(),
            ));
            endpoints.push(Arc::new(Endpoint {
                id: EndpointId(addr),
                config: config.clone(),
                pool,
            }));
        }

        // Stable sort preserves registration order within a priority tier
        endpoints.sort_by_key(|e| e.priority());

        Ok(Self { endpoints })
    }

    /// Endpoints in failover order.
    pub fn list(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn get(&self, id: &EndpointId) -> Option<&Arc<Endpoint>> {
        self.endpoints.iter().find(|e| &e.id == id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn validate_address(config: &EndpointConfig) -> Result<(), ConfigError> {
    let host = config.host.trim();
    if host.is_empty() {
        return Err(ConfigError::InvalidEndpoint("empty host".to_string()));
    }
    if host.contains(':') || host.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidEndpoint(format!(
            "malformed host {:?}",
            config.host
        )));
    }
    if config.port == 0 {
        return Err(ConfigError::InvalidEndpoint(format!(
            "port 0 for host {host}"
        )));
    }
    Ok(())
}
