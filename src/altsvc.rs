//! Alt-Svc cache: parses `Alt-Svc` response headers and tracks whether an
//! origin has HTTP/3 available, including negative caching for origins
//! that advertised H3 but failed to actually speak it (spec §4.K).
//!
//! Shares the slab+HashMap+`parking_lot::Mutex` shape `tls::SessionCache`
//! uses, since both are small capacity-bounded caches keyed by origin —
//! grounded on the original `holytls` `src/holytls/http/alt_svc_cache.cc`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Upper bound on how long an Alt-Svc advertisement is trusted, regardless
/// of what `max-age` the server sent (spec §4.K: capped at 7 days).
const MAX_ADVERTISEMENT_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long a negative ("this origin claimed H3 but a connection attempt
/// failed") entry is remembered before H3 is retried.
const NEGATIVE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct AltSvcEndpoint {
    pub host: String,
    pub port: u16,
}

enum Entry {
    Advertised { endpoint: AltSvcEndpoint, expires_at: Instant },
    NegativelyCached { expires_at: Instant },
}

/// Parses an `Alt-Svc` header value, e.g. `h3=":443"; ma=86400, h3-29=":443"`.
/// Returns the first `h3` entry found, with its `max-age` capped at
/// `MAX_ADVERTISEMENT_AGE`.
pub fn parse_alt_svc_header(value: &str, default_host: &str) -> Option<(AltSvcEndpoint, Duration)> {
    for directive in value.split(',') {
        let mut parts = directive.split(';').map(str::trim);
        let protocol_and_authority = parts.next()?;
        let (protocol, authority) = protocol_and_authority.split_once('=')?;
        if protocol != "h3" {
            continue;
        }
        let authority = authority.trim_matches('"');
        let (host, port_str) = match authority.rsplit_once(':') {
            Some((h, p)) if !h.is_empty() => (h, p),
            Some((_, p)) => (default_host, p),
            None => continue,
        };
        let port: u16 = port_str.parse().ok()?;

        let mut max_age = Duration::from_secs(24 * 60 * 60);
        for attr in parts {
            if let Some((key, val)) = attr.split_once('=') {
                if key.trim() == "ma" {
                    if let Ok(secs) = val.trim().parse::<u64>() {
                        max_age = Duration::from_secs(secs);
                    }
                }
            }
        }
        let host = if host.is_empty() { default_host } else { host };
        return Some((AltSvcEndpoint { host: host.to_string(), port }, max_age.min(MAX_ADVERTISEMENT_AGE)));
    }
    None
}

pub struct AltSvcCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl AltSvcCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    fn key(host: &str, port: u16) -> String {
        format!("{host}:{port}")
    }

    /// Records an Alt-Svc advertisement for `origin`, ignored if a
    /// negative cache entry for the same origin is still live (spec §4.K:
    /// a fresh negative result outranks a new advertisement until it
    /// expires, to avoid flapping between H3 attempts and fallback).
    pub fn record_advertisement(&self, host: &str, port: u16, endpoint: AltSvcEndpoint, max_age: Duration) {
        let mut entries = self.entries.lock();
        let key = Self::key(host, port);
        if let Some(Entry::NegativelyCached { expires_at }) = entries.get(&key) {
            if *expires_at > Instant::now() {
                return;
            }
        }
        entries.insert(key, Entry::Advertised { endpoint, expires_at: Instant::now() + max_age });
    }

    /// Returns the HTTP/3 endpoint for `host:port`, if advertised and
    /// neither expired nor negatively cached.
    pub fn get_http3_endpoint(&self, host: &str, port: u16) -> Option<AltSvcEndpoint> {
        let entries = self.entries.lock();
        match entries.get(&Self::key(host, port))? {
            Entry::Advertised { endpoint, expires_at } if *expires_at > Instant::now() => Some(endpoint.clone()),
            _ => None,
        }
    }

    /// Marks `host:port` as having failed an HTTP/3 connection attempt,
    /// so subsequent requests fall back to HTTP/2 without retrying H3 for
    /// `NEGATIVE_CACHE_TTL`.
    pub fn mark_http3_failed(&self, host: &str, port: u16) {
        let mut entries = self.entries.lock();
        entries.insert(Self::key(host, port), Entry::NegativelyCached { expires_at: Instant::now() + NEGATIVE_CACHE_TTL });
    }

    pub fn clear_http3_failure(&self, host: &str, port: u16) {
        let mut entries = self.entries.lock();
        if matches!(entries.get(&Self::key(host, port)), Some(Entry::NegativelyCached { .. })) {
            entries.remove(&Self::key(host, port));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for AltSvcCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_h3_directive_with_explicit_host() {
        let (endpoint, _) = parse_alt_svc_header(r#"h3="alt.example.com:443"; ma=3600"#, "origin.example.com").unwrap();
        assert_eq!(endpoint.host, "alt.example.com");
        assert_eq!(endpoint.port, 443);
    }

    #[test]
    fn parses_h3_directive_with_implicit_host() {
        let (endpoint, _) = parse_alt_svc_header(r#"h3=":443"; ma=86400"#, "origin.example.com").unwrap();
        assert_eq!(endpoint.host, "origin.example.com");
        assert_eq!(endpoint.port, 443);
    }

    #[test]
    fn skips_non_h3_protocols() {
        assert!(parse_alt_svc_header(r#"h2=":443"; ma=3600"#, "origin.example.com").is_none());
    }

    #[test]
    fn max_age_is_capped_at_seven_days() {
        let (_, max_age) = parse_alt_svc_header(r#"h3=":443"; ma=999999999"#, "origin.example.com").unwrap();
        assert_eq!(max_age, MAX_ADVERTISEMENT_AGE);
    }

    #[test]
    fn record_then_get_round_trips() {
        let cache = AltSvcCache::new();
        cache.record_advertisement(
            "origin.example.com",
            443,
            AltSvcEndpoint { host: "origin.example.com".to_string(), port: 443 },
            Duration::from_secs(3600),
        );
        assert!(cache.get_http3_endpoint("origin.example.com", 443).is_some());
    }

    #[test]
    fn negative_cache_blocks_new_advertisements_until_expiry() {
        let cache = AltSvcCache::new();
        cache.mark_http3_failed("origin.example.com", 443);
        cache.record_advertisement(
            "origin.example.com",
            443,
            AltSvcEndpoint { host: "origin.example.com".to_string(), port: 443 },
            Duration::from_secs(3600),
        );
        assert!(cache.get_http3_endpoint("origin.example.com", 443).is_none());
    }

    #[test]
    fn clear_http3_failure_allows_future_advertisements() {
        let cache = AltSvcCache::new();
        cache.mark_http3_failed("origin.example.com", 443);
        cache.clear_http3_failure("origin.example.com", 443);
        cache.record_advertisement(
            "origin.example.com",
            443,
            AltSvcEndpoint { host: "origin.example.com".to_string(), port: 443 },
            Duration::from_secs(3600),
        );
        assert!(cache.get_http3_endpoint("origin.example.com", 443).is_some());
    }
}
