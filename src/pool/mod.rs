//! Connection pooling: per-host slots, origin routing, and retry policy
//! (spec §4.K).

mod connection_pool;
mod host_pool;

pub use connection_pool::{
    AcquireRetryPolicy, ConnectRetryPolicy, ConnectionPool, ProtocolChoice, ACQUIRE_RETRY, CONNECT_RETRY,
};
pub use host_pool::HostPool;
