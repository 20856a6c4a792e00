//! Off-loop DNS resolution (spec §4.O).
//!
//! Since this crate has no async runtime, `getaddrinfo` calls — which
//! block — are dispatched onto `rayon`'s global thread pool rather than
//! the reactor thread, with the result handed back via the requesting
//! reactor's `post()` so the continuation still runs on the correct shard.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{DnsError, HolyError};
use crate::reactor::ReactorPoster;

use super::cache::DnsCache;

/// Resolves `host:port`, consulting `cache` first and populating it on a
/// successful lookup. The blocking `ToSocketAddrs` call runs on rayon's
/// pool; `on_done` is invoked back on `poster`'s reactor thread.
pub fn resolve_async(
    cache: DnsCache,
    poster: ReactorPoster,
    host: String,
    port: u16,
    on_done: impl FnOnce(Result<Vec<SocketAddr>, HolyError>) + Send + 'static,
) {
    if let Some(addrs) = cache.get(&host) {
        let _ = poster.post(move |_handle| on_done(Ok(addrs)));
        return;
    }

    rayon::spawn(move || {
        let result = resolve_blocking(&cache, &host, port);
        let _ = poster.post(move |_handle| on_done(result));
    });
}

fn resolve_blocking(cache: &DnsCache, host: &str, port: u16) -> Result<Vec<SocketAddr>, HolyError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| HolyError::Dns(DnsError::ResolutionFailed { host: host.to_string(), source: e }))?
        .collect();

    if addrs.is_empty() {
        return Err(HolyError::Dns(DnsError::ResolutionFailed {
            host: host.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses returned"),
        }));
    }

    cache.insert(host, addrs.clone());
    Ok(addrs)
}
