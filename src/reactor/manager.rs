//! Sharded reactor pool (spec §4.D/§5).
//!
//! `ReactorManager` owns N `Reactor`s, each pinned to its own OS thread,
//! and routes a given origin to always the same shard via FNV-1a of
//! `host:port` — so one origin's connections never cross shards, and no
//! cross-thread locking is needed for per-connection state. Grounded on the
//! original `holytls` `ReactorManager`'s sharding design; the FNV-1a choice
//! matches what the `fnv` crate (already in the teacher's dependency
//! lineage via `primp-h2`) provides directly.

use std::hash::Hasher;
use std::io;
use std::thread::JoinHandle;

use fnv::FnvHasher;

use super::core::{Reactor, ReactorPoster};

/// One shard: its poster (for cross-thread scheduling) and the join handle
/// of the thread running its event loop.
struct Shard {
    poster: ReactorPoster,
    join_handle: Option<JoinHandle<()>>,
}

/// Owns a fixed set of reactor shards and routes work to them by origin.
pub struct ReactorManager {
    shards: Vec<Shard>,
}

impl ReactorManager {
    /// Spawns `num_shards` reactor threads (each running its own `Reactor`
    /// to completion via `run(None)`, i.e. forever until `stop()`).
    /// `num_shards == 0` is resolved by the caller (spec §3 `ThreadsConfig`
    /// `num_workers = 0` means "use the CPU count") before reaching here.
    pub fn spawn(num_shards: usize) -> io::Result<Self> {
        assert!(num_shards > 0, "ReactorManager requires at least one shard");

        let mut shards = Vec::with_capacity(num_shards);
        for index in 0..num_shards {
            let mut reactor = Reactor::new()?;
            let poster = reactor.poster();
            let join_handle = std::thread::Builder::new()
                .name(format!("holytls-reactor-{index}"))
                .spawn(move || {
                    let _ = reactor.run(None);
                })?;
            shards.push(Shard { poster, join_handle: Some(join_handle) });
        }
        Ok(Self { shards })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// FNV-1a hash of `host:port`, used to pick a shard deterministically
    /// so repeated requests to the same origin land on the same reactor.
    pub fn shard_index_for(&self, host: &str, port: u16) -> usize {
        let mut hasher = FnvHasher::default();
        hasher.write(host.as_bytes());
        hasher.write_u8(b':');
        hasher.write_u16(port);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Returns the poster for the shard `host:port` is routed to.
    pub fn poster_for(&self, host: &str, port: u16) -> &ReactorPoster {
        &self.shards[self.shard_index_for(host, port)].poster
    }

    pub fn poster_at(&self, index: usize) -> &ReactorPoster {
        &self.shards[index].poster
    }

    /// Signals every shard to stop and joins their threads. Best-effort:
    /// a shard whose thread already panicked is skipped.
    pub fn shutdown(mut self) {
        for shard in &self.shards {
            let _ = shard.poster.post(|_handle| {});
        }
        for shard in &mut self.shards {
            if let Some(handle) = shard.join_handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_origin_always_routes_to_the_same_shard() {
        let manager = ReactorManager::spawn(4).expect("spawn");
        let a = manager.shard_index_for("example.com", 443);
        let b = manager.shard_index_for("example.com", 443);
        assert_eq!(a, b);
        manager.shutdown();
    }

    #[test]
    fn shard_index_is_within_bounds() {
        let manager = ReactorManager::spawn(3).expect("spawn");
        for port in 0..50u16 {
            let idx = manager.shard_index_for("host.example", port);
            assert!(idx < 3);
        }
        manager.shutdown();
    }

    #[test]
    fn different_ports_can_land_on_different_shards() {
        let manager = ReactorManager::spawn(8).expect("spawn");
        let mut seen = std::collections::HashSet::new();
        for port in 0..200u16 {
            seen.insert(manager.shard_index_for("host.example", port));
        }
        assert!(seen.len() > 1, "expected ports to spread across shards");
        manager.shutdown();
    }
}
