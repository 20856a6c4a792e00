//! Per-host connection pool: a fixed-capacity set of connection slots for
//! one `(host, port, protocol)` triple (spec §4.K, §4.L `HasCapacity`).
//!
//! Grounded on the original `holytls` `src/holytls/pool/connection_pool.h`'s
//! per-host slot design: a small `Vec` rather than a queue, since pool
//! sizes are bounded (`PoolConfig::max_connections_per_host`, default 6)
//! and linear scans over it are cheaper than the bookkeeping a queue
//! would need. Each slot carries its own active-stream count, an HTTP/2
//! multiplexing ceiling, an error tally, and a removal flag, rather than
//! the pool aggregating a single flat `in_use_count` — a flat counter
//! cannot tell two in-use HTTP/2 connections (one maxed out on streams,
//! one with room for ten more) apart, and `has_capacity` needs exactly
//! that distinction to decide whether opening a new TCP connection is
//! worth it versus handing out another stream on an existing one.

use std::time::{Duration, Instant};

/// One pooled connection and its multiplexing state.
pub struct PoolEntry<C> {
    pub conn: C,
    /// Requests currently dispatched on this connection and awaiting a
    /// response. HTTP/1.1 connections only ever reach 1 (no pipelining,
    /// spec §4.G); HTTP/2 connections can carry up to `max_streams`.
    active_streams: usize,
    /// Concurrency ceiling for this connection — 1 for HTTP/1.1, the
    /// peer's advertised `SETTINGS_MAX_CONCURRENT_STREAMS` for HTTP/2
    /// (`PoolConfig::max_streams_per_connection` until that's known).
    max_streams: usize,
    /// Consecutive request failures seen on this connection. Exists so a
    /// connection that's gone bad without closing outright (e.g. a peer
    /// that stalls mid-stream) can be weeded out before it's handed out
    /// again; nothing increments this yet (see DESIGN.md).
    error_count: u32,
    /// Set once the owning `Connection` has torn down; `reap_expired` and
    /// capacity checks both skip marked slots, and the next idle sweep
    /// drops them entirely.
    marked_for_removal: bool,
    idle_since: Option<Instant>,
}

impl<C> PoolEntry<C> {
    pub fn conn(&self) -> &C {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn active_streams(&self) -> usize {
        self.active_streams
    }

    pub fn has_stream_capacity(&self) -> bool {
        !self.marked_for_removal && self.active_streams < self.max_streams
    }

    pub fn is_idle(&self) -> bool {
        !self.marked_for_removal && self.active_streams == 0
    }
}

/// Holds every connection slot (idle or in-use) for one origin.
pub struct HostPool<C> {
    slots: Vec<PoolEntry<C>>,
    max_connections: usize,
}

impl<C> HostPool<C> {
    pub fn new(max_connections: usize) -> Self {
        Self { slots: Vec::new(), max_connections: max_connections.max(1) }
    }

    /// True if a new request could be served either by opening a fresh
    /// connection (slot count below the cap) or by reusing an existing
    /// connection that still has multiplexing headroom.
    pub fn has_capacity(&self) -> bool {
        self.slots.len() < self.max_connections || self.slots.iter().any(|s| s.has_stream_capacity())
    }

    pub fn total_connections(&self) -> usize {
        self.slots.iter().filter(|s| !s.marked_for_removal).count()
    }

    /// Finds a connection with spare HTTP/2 stream capacity, or a fully
    /// idle HTTP/1.1 connection, and claims one stream's worth of it.
    pub fn acquire_idle(&mut self) -> Option<&mut C> {
        let slot = self.slots.iter_mut().find(|s| s.has_stream_capacity())?;
        slot.active_streams += 1;
        slot.idle_since = None;
        Some(&mut slot.conn)
    }

    /// Registers a brand-new connection as immediately carrying one active
    /// stream (the caller just finished its handshake and is about to
    /// submit a request on it). `max_streams` is 1 for HTTP/1.1 and the
    /// negotiated concurrency limit for HTTP/2.
    pub fn register_new_in_use(&mut self, conn: C, max_streams: usize) {
        self.slots.push(PoolEntry {
            conn,
            active_streams: 1,
            max_streams: max_streams.max(1),
            error_count: 0,
            marked_for_removal: false,
            idle_since: None,
        });
    }

    /// Releases one stream's worth of capacity back to its connection,
    /// which becomes idle once every stream on it has finished.
    pub fn release(&mut self) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.active_streams > 0) {
            slot.active_streams -= 1;
            if slot.active_streams == 0 {
                slot.idle_since = Some(Instant::now());
            }
        }
    }

    /// Drops one stream's worth of in-use accounting without the
    /// connection itself surviving — used when a connection errors out
    /// from under an in-flight request.
    pub fn remove_in_use(&mut self) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.active_streams > 0) {
            slot.active_streams -= 1;
            slot.error_count += 1;
            if slot.active_streams == 0 {
                slot.marked_for_removal = true;
            }
        }
    }

    /// Evicts connections that have sat fully idle past `idle_timeout`,
    /// plus any already marked for removal, returning how many were
    /// reaped.
    pub fn reap_expired(&mut self, idle_timeout: Duration) -> usize {
        let before = self.slots.len();
        let now = Instant::now();
        self.slots.retain(|s| {
            if s.marked_for_removal {
                return false;
            }
            match s.idle_since {
                Some(since) => now.duration_since(since) < idle_timeout,
                None => true,
            }
        });
        before - self.slots.len()
    }

    pub fn idle_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_idle()).count()
    }

    pub fn in_use_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active_streams > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn acquire_idle_returns_none_when_empty() {
        let mut pool: HostPool<u32> = HostPool::new(4);
        assert!(pool.acquire_idle().is_none());
    }

    #[test]
    fn release_then_acquire_round_trips() {
        let mut pool: HostPool<u32> = HostPool::new(4);
        pool.register_new_in_use(42, 1);
        pool.release();
        assert_eq!(pool.acquire_idle().copied(), Some(42));
    }

    #[test]
    fn has_capacity_respects_max_connections() {
        let mut pool: HostPool<u32> = HostPool::new(2);
        pool.register_new_in_use(1, 1);
        pool.register_new_in_use(2, 1);
        assert!(!pool.has_capacity());
    }

    #[test]
    fn multiplexed_connection_has_capacity_for_more_streams_without_a_new_slot() {
        let mut pool: HostPool<u32> = HostPool::new(1);
        pool.register_new_in_use(1, 100);
        assert!(pool.has_capacity());
        assert_eq!(pool.acquire_idle().copied(), Some(1));
        assert_eq!(pool.in_use_count(), 1);
    }

    #[test]
    fn remove_in_use_marks_connection_for_removal_once_drained() {
        let mut pool: HostPool<u32> = HostPool::new(4);
        pool.register_new_in_use(1, 1);
        pool.remove_in_use();
        assert_eq!(pool.total_connections(), 0);
        assert!(pool.has_capacity());
    }

    #[test]
    fn reap_expired_evicts_old_idle_connections() {
        let mut pool: HostPool<u32> = HostPool::new(4);
        pool.register_new_in_use(1, 1);
        pool.release();
        sleep(Duration::from_millis(20));
        let reaped = pool.reap_expired(Duration::from_millis(5));
        assert_eq!(reaped, 1);
        assert_eq!(pool.idle_count(), 0);
    }
}
