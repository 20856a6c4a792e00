//! Origin-keyed connection pool with Alt-Svc-aware protocol selection and
//! the acquire retry policy (spec §4.K).

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use super::host_pool::HostPool;

/// Backoff policy for a failed *connect* attempt to one origin: up to 10
/// attempts, starting at 100ms and doubling, capped at 2s per step
/// (spec §4.K retry policy, connect leg).
pub struct ConnectRetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

pub const CONNECT_RETRY: ConnectRetryPolicy =
    ConnectRetryPolicy { max_attempts: 10, base_delay: Duration::from_millis(100), max_delay: Duration::from_secs(2) };

impl ConnectRetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(16);
        let scaled = self.base_delay.saturating_mul(1u32 << shift);
        scaled.min(self.max_delay)
    }
}

/// Retry policy for *acquiring a pooled slot* when the pool is momentarily
/// at capacity: up to 50 short polls, bounded by an overall 5s deadline
/// (spec §4.K retry policy, acquire leg) — distinct from `ConnectRetryPolicy`
/// because this path never touches the network, it just waits for a peer
/// to release a connection.
pub struct AcquireRetryPolicy {
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub overall_timeout: Duration,
}

pub const ACQUIRE_RETRY: AcquireRetryPolicy = AcquireRetryPolicy {
    max_attempts: 50,
    poll_interval: Duration::from_millis(100),
    overall_timeout: Duration::from_secs(5),
};

/// Which protocol a new connection to an origin should attempt, resolved
/// from configuration plus any cached Alt-Svc advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolChoice {
    Http1,
    Http2,
    Http3,
}

/// Origin-keyed map of `HostPool`s. One `ConnectionPool` is shared by every
/// reactor shard that might handle the same origin (origins are
/// shard-sticky per `ReactorManager`, but the pool itself stays global so
/// pool-size accounting is never split across shards).
pub struct ConnectionPool<C> {
    pools: Mutex<HashMap<String, HostPool<C>>>,
    max_connections_per_host: usize,
}

impl<C> ConnectionPool<C> {
    pub fn new(max_connections_per_host: usize) -> Self {
        Self { pools: Mutex::new(HashMap::new()), max_connections_per_host }
    }

    fn origin_key(host: &str, port: u16) -> String {
        format!("{host}:{port}")
    }

    pub fn has_capacity(&self, host: &str, port: u16) -> bool {
        let mut pools = self.pools.lock();
        pools
            .entry(Self::origin_key(host, port))
            .or_insert_with(|| HostPool::new(self.max_connections_per_host))
            .has_capacity()
    }

    /// Registers a brand-new connection as immediately carrying one active
    /// stream. `max_streams` is 1 for HTTP/1.1, or the negotiated HTTP/2
    /// concurrency limit.
    pub fn register_new_in_use(&self, host: &str, port: u16, conn: C, max_streams: usize) {
        let mut pools = self.pools.lock();
        pools
            .entry(Self::origin_key(host, port))
            .or_insert_with(|| HostPool::new(self.max_connections_per_host))
            .register_new_in_use(conn, max_streams);
    }

    pub fn release(&self, host: &str, port: u16) {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get_mut(&Self::origin_key(host, port)) {
            pool.release();
        }
    }

    pub fn remove_in_use(&self, host: &str, port: u16) {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get_mut(&Self::origin_key(host, port)) {
            pool.remove_in_use();
        }
    }

    /// Reaps idle connections past `idle_timeout` across every origin,
    /// called periodically by the reactor that owns this pool.
    pub fn reap_expired(&self, idle_timeout: Duration) -> usize {
        let mut pools = self.pools.lock();
        pools.values_mut().map(|p| p.reap_expired(idle_timeout)).sum()
    }

    pub fn total_connections(&self, host: &str, port: u16) -> usize {
        let pools = self.pools.lock();
        pools.get(&Self::origin_key(host, port)).map(|p| p.total_connections()).unwrap_or(0)
    }
}
