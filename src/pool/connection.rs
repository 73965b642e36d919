use async_trait::async_trait;
use tokio::time::Instant;
use std::time::Duration;

use crate::config::EndpointConfig;
use crate::error::{DbError, ErrorKind};
use crate::statement::{QueryResult, Row, Statement};

/// One physical connection to a backend, as the driver exposes it.
///
/// The actual driver lives outside this crate; it plugs in here. Errors
/// returned by implementations must already be classified (see
/// [`crate::error::classify_server_error`] and
/// [`crate::error::classify_message`]).
#[async_trait]
pub trait RawConnection: Send {
    /// Run a statement to completion and return the full result set.
    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, DbError>;

    /// Start a streaming query. Rows are then pulled with [`next_row`].
    ///
    /// [`next_row`]: RawConnection::next_row
    async fn open_stream(&mut self, statement: &Statement) -> Result<(), DbError>;

    /// Pull the next row of an open streaming query; `None` when exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>, DbError>;

    /// Lightweight liveness check (no-op query).
    async fn ping(&mut self) -> Result<(), DbError>;
}

/// Factory for physical connections; the dependency-injection seam that
/// lets tests run against fake endpoints.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &EndpointConfig) -> Result<Box<dyn RawConnection>, DbError>;
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is available for use
    Idle,
    /// Connection is currently in use
    InUse,
    /// Connection is broken or in an unknown server-side state
    Closed,
}

/// A driver connection plus pool bookkeeping.
pub struct PooledConnection {
    raw: Box<dyn RawConnection>,
    state: ConnectionState,
    created_at: Instant,
    last_used_at: Instant,
}

impl PooledConnection {
    pub fn new(raw: Box<dyn RawConnection>) -> Self {
        let now = Instant::now();
        Self {
            raw,
            state: ConnectionState::Idle,
            created_at: now,
            last_used_at: now,
        }
    }

    /// Run a statement, tracking connection state.
    ///
    /// Connection-class and timeout errors close the connection; statement
    /// errors leave it usable (the server answered, the query was bad).
    pub async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, DbError> {
        let result = self.raw.execute(statement).await;
        self.observe(&result);
        result
    }

    pub async fn open_stream(&mut self, statement: &Statement) -> Result<(), DbError> {
        let result = self.raw.open_stream(statement).await;
        self.observe(&result);
        result
    }

    pub async fn next_row(&mut self) -> Result<Option<Row>, DbError> {
        let result = self.raw.next_row().await;
        self.observe(&result);
        result
    }

    pub async fn ping(&mut self) -> Result<(), DbError> {
        let result = self.raw.ping().await;
        self.observe(&result);
        result
    }

    fn observe<T>(&mut self, result: &Result<T, DbError>) {
        match result {
            Ok(_) => self.last_used_at = Instant::now(),
            Err(e) => {
                if e.kind() != ErrorKind::Statement {
                    self.state = ConnectionState::Closed;
                }
            }
        }
    }

    /// Check if connection has exceeded max age
    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.created_at.elapsed() > max_age
    }

    /// Check if connection has been idle too long
    pub fn is_idle_too_long(&self, max_idle: Duration) -> bool {
        self.last_used_at.elapsed() > max_idle
    }

    /// Mark connection as in use
    pub fn acquire(&mut self) {
        self.state = ConnectionState::InUse;
        self.last_used_at = Instant::now();
    }

    /// Mark connection as available
    pub fn release(&mut self) {
        self.state = ConnectionState::Idle;
        self.last_used_at = Instant::now();
    }

    /// Mark connection as closed; it will never be repooled
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Check if connection is usable
    pub fn is_usable(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}
