use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{EndpointConfig, PoolConfig};
use crate::error::DbError;

use super::connection::{Connector, PooledConnection};

/// Pool of reusable physical connections for one endpoint.
///
/// Connections are borrowed through [`ConnectionGuard`] and returned when
/// the guard drops, so every exit path, including cancellation, releases
/// the connection. The idle deque uses a sync lock: critical sections are
/// a pop or a push, and a drop handler must be able to return a connection
/// without awaiting.
pub struct EndpointPool {
    endpoint: EndpointConfig,
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    idle: Mutex<VecDeque<PooledConnection>>,
}

impl EndpointPool {
    pub fn new(endpoint: EndpointConfig, config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            endpoint,
            config,
            connector,
            idle: Mutex::new(VecDeque::new()),
        }
    }

    /// Get a connection, reusing an idle one if possible.
    pub async fn get(self: &Arc<Self>) -> Result<ConnectionGuard, DbError> {
        while let Some(mut conn) = { self.idle.lock().pop_front() } {
            if conn.is_expired(self.config.max_age()) {
                debug!(endpoint = %self.endpoint.addr(), "Connection expired, discarding");
                continue;
            }
            if conn.is_idle_too_long(self.config.max_idle_time()) {
                debug!(endpoint = %self.endpoint.addr(), "Connection idle too long, discarding");
                continue;
            }
            conn.acquire();
            debug!(endpoint = %self.endpoint.addr(), "Reusing idle connection");
            return Ok(ConnectionGuard {
                conn: Some(conn),
                pool: Arc::clone(self),
            });
        }

        debug!(endpoint = %self.endpoint.addr(), "Creating new connection");
        let raw = self.connector.connect(&self.endpoint).await?;
        let mut conn = PooledConnection::new(raw);
        conn.acquire();
        Ok(ConnectionGuard {
            conn: Some(conn),
            pool: Arc::clone(self),
        })
    }

    /// Return a connection to the pool; full pools and unusable or expired
    /// connections drop it instead.
    fn put(&self, mut conn: PooledConnection) {
        conn.release();

        if !conn.is_usable() {
            debug!(endpoint = %self.endpoint.addr(), "Connection not usable, discarding");
            return;
        }
        if conn.is_expired(self.config.max_age()) {
            debug!(endpoint = %self.endpoint.addr(), "Connection expired, discarding");
            return;
        }

        let mut idle = self.idle.lock();
        if idle.len() >= self.config.max_idle {
            debug!(endpoint = %self.endpoint.addr(), "Pool full, discarding connection");
            return;
        }
        idle.push_back(conn);
    }

    /// Current number of idle connections
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Close all idle connections
    pub fn close_all(&self) {
        self.idle.lock().clear();
    }

    /// Endpoint address (host:port) for this pool
    pub fn addr(&self) -> String {
        self.endpoint.addr()
    }
}

/// Checked-out connection; returns itself to the pool on drop.
pub struct ConnectionGuard {
    conn: Option<PooledConnection>,
    pool: Arc<EndpointPool>,
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("addr", &self.pool.addr())
            .finish_non_exhaustive()
    }
}

impl ConnectionGuard {
    /// Mark the connection as unreusable; it is dropped instead of pooled.
    ///
    /// Used when the server-side state is unknown (execution timeout, mid
    /// transaction abandonment).
    pub fn discard(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.close();
        }
    }
}

impl Deref for ConnectionGuard {
    type Target = PooledConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for ConnectionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn);
        }
    }
}
