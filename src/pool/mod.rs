mod connection;
mod idle;

pub use connection::{ConnectionState, Connector, PooledConnection, RawConnection};
pub use idle::{ConnectionGuard, EndpointPool};
