//! Error taxonomy and classification.
//!
//! Classification happens once, close to the point of failure, and the
//! resulting kind travels with the error. Everything downstream (retry
//! policy, circuit breaker, router) asks the error for its kind instead of
//! re-inspecting driver codes or messages.

use std::time::Duration;

/// Which bounded phase of an operation timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Waiting for a physical connection from an endpoint's pool.
    Acquire,
    /// Running a statement on an already-held connection.
    Execute,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutPhase::Acquire => write!(f, "connection acquisition"),
            TimeoutPhase::Execute => write!(f, "statement execution"),
        }
    }
}

/// Classified database error.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Transport-level failure: refused, reset, proxy gone, limit exceeded.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// The server is out of a resource (disk, memory). Retryable only by
    /// failing over to a different endpoint.
    #[error("server resource exhausted: {message}")]
    ResourceExhausted { message: String },

    /// The statement itself was rejected. The endpoint is healthy; the
    /// query was bad.
    #[error("statement rejected (code {code}): {message}")]
    Statement { code: u16, message: String },

    /// A bounded phase exceeded its limit.
    #[error("{phase} timed out after {limit:?}")]
    Timeout { phase: TimeoutPhase, limit: Duration },

    /// One full failover pass found no endpoint that could be acquired.
    /// Terminal: not consumed by the retry loop.
    #[error("all endpoints unavailable")]
    Unavailable {
        #[source]
        last: Option<Box<DbError>>,
    },

    /// The caller's deadline or a shutdown signal cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

/// Coarse error kind used by the retry policy and circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    ResourceExhausted,
    Statement,
    Timeout,
    Unavailable,
    Cancelled,
}

impl DbError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout(phase: TimeoutPhase, limit: Duration) -> Self {
        Self::Timeout { phase, limit }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::Statement { .. } => ErrorKind::Statement,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the retry policy may spend an attempt on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection | ErrorKind::ResourceExhausted | ErrorKind::Timeout
        )
    }

    /// Whether this error increments the endpoint's consecutive-failure
    /// counter. Statement errors never do: the endpoint answered.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection | ErrorKind::ResourceExhausted | ErrorKind::Timeout
        )
    }
}

/// Server error codes with a known classification.
///
/// The closed set of codes we care about, MySQL numbering. Anything not in
/// this table falls through to [`classify_message`].
const CONNECTION_CODES: &[u16] = &[
    1040, // ER_CON_COUNT_ERROR: too many connections
    1042, // ER_BAD_HOST_ERROR
    1043, // ER_HANDSHAKE_ERROR
    1053, // ER_SERVER_SHUTDOWN
    1077, // ER_NORMAL_SHUTDOWN
    1152, // ER_ABORTING_CONNECTION
    1159, // ER_NET_READ_INTERRUPTED
    1160, // ER_NET_ERROR_ON_WRITE
    1161, // ER_NET_WRITE_INTERRUPTED
    2002, // CR_CONNECTION_ERROR
    2003, // CR_CONN_HOST_ERROR
    2006, // CR_SERVER_GONE_ERROR
    2013, // CR_SERVER_LOST
];

const RESOURCE_CODES: &[u16] = &[
    1021, // ER_DISK_FULL
    1037, // ER_OUTOFMEMORY
    1038, // ER_OUT_OF_SORTMEMORY
    1041, // ER_OUT_OF_RESOURCES
];

/// Message substrings that identify a connection-class failure when no
/// known code is present. Matched case-insensitively.
const CONNECTION_SUBSTRINGS: &[&str] = &[
    "connection refused",
    "connection reset",
    "broken pipe",
    "server has gone away",
    "shutting down",
    "pool exhausted",
    "no route to host",
];

const RESOURCE_SUBSTRINGS: &[&str] = &["disk full", "out of memory", "out of resources"];

/// Classify a server error by code, falling back to message inspection.
///
/// Codes outside the known connection/resource sets are statement-level:
/// constraint violations, syntax errors, permission errors and the like are
/// the server telling us the query is bad, not that the endpoint is.
pub fn classify_server_error(code: u16, message: &str) -> DbError {
    if CONNECTION_CODES.contains(&code) {
        return DbError::Connection {
            message: format!("server error {code}: {message}"),
        };
    }
    if RESOURCE_CODES.contains(&code) {
        return DbError::ResourceExhausted {
            message: format!("server error {code}: {message}"),
        };
    }
    DbError::Statement {
        code,
        message: message.to_string(),
    }
}

/// Classify a transport-level failure that carries no server code.
pub fn classify_message(message: &str) -> DbError {
    let lower = message.to_ascii_lowercase();
    if RESOURCE_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return DbError::ResourceExhausted {
            message: message.to_string(),
        };
    }
    if CONNECTION_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return DbError::Connection {
            message: message.to_string(),
        };
    }
    // Unrecognized transport errors are treated as connection-class: the
    // safe default is to fail over rather than surface them as fatal.
    DbError::Connection {
        message: message.to_string(),
    }
}
