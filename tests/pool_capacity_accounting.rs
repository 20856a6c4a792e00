//! `Client::request` uses `ConnectionPool<()>` purely for capacity
//! accounting: it checks `has_capacity`, calls `register_new_in_use`
//! immediately with a single-stream slot, and a `PoolGuard` calls
//! `remove_in_use` on drop once the request finishes (success or error).
//! This exercises that exact cycle against the real pool type,
//! independent of any network I/O, to pin down the accounting semantics
//! `client.rs` depends on.

use holytls::pool::ConnectionPool;

#[test]
fn capacity_is_exhausted_after_max_in_use_and_frees_on_guard_drop() {
    let pool: ConnectionPool<()> = ConnectionPool::new(2);
    let host = "example.com";
    let port = 443;

    assert!(pool.has_capacity(host, port));
    pool.register_new_in_use(host, port, (), 1);
    assert!(pool.has_capacity(host, port));
    pool.register_new_in_use(host, port, (), 1);
    assert!(!pool.has_capacity(host, port), "pool should be exhausted at max_connections_per_host");

    pool.remove_in_use(host, port);
    assert!(pool.has_capacity(host, port), "releasing a slot should restore capacity");
}

#[test]
fn distinct_origins_get_independent_capacity() {
    let pool: ConnectionPool<()> = ConnectionPool::new(1);
    pool.register_new_in_use("a.example.com", 443, (), 1);
    assert!(!pool.has_capacity("a.example.com", 443));
    assert!(pool.has_capacity("b.example.com", 443), "a different host must not share a.example.com's slot");
}

#[test]
fn remove_in_use_without_a_prior_register_does_not_underflow() {
    let pool: ConnectionPool<()> = ConnectionPool::new(1);
    pool.remove_in_use("example.com", 443);
    assert!(pool.has_capacity("example.com", 443));
    pool.register_new_in_use("example.com", 443, (), 1);
    assert!(!pool.has_capacity("example.com", 443));
}

#[test]
fn a_multiplexed_slot_absorbs_extra_streams_without_opening_a_new_connection() {
    let pool: ConnectionPool<()> = ConnectionPool::new(1);
    pool.register_new_in_use("example.com", 443, (), 100);
    assert!(
        pool.has_capacity("example.com", 443),
        "an HTTP/2 connection with spare stream capacity should still report capacity \
         even though the connection slot count is at its cap"
    );
}
