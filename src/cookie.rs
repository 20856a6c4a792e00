//! RFC 6265 cookie jar (spec §4.Q).
//!
//! Cross-reactor shared state, alongside `tls::SessionCache` and
//! `altsvc::AltSvcCache` — same `parking_lot::Mutex`-guarded map shape as
//! both, keyed by `(name, case-folded domain, path)` per spec §3's Cookie
//! invariants.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub host_only: bool,
    pub path: String,
    /// Milliseconds since the epoch; `0` means a session cookie.
    pub expires_ms: u64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Cookie {
    fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_ms != 0 && self.expires_ms <= now_ms
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Parses one `Set-Cookie` header value into a `Cookie`, validated against
/// `request_host`. Returns `None` if the header is malformed or the
/// `Domain` attribute isn't the request host or a proper parent of it.
fn parse_set_cookie(request_host: &str, request_path: &str, header: &str) -> Option<Cookie> {
    let mut parts = header.split(';').map(str::trim);
    let (name, value) = parts.next()?.split_once('=')?;
    let (name, value) = (name.trim().to_string(), value.trim().to_string());
    if name.is_empty() {
        return None;
    }

    let mut domain: Option<String> = None;
    let mut path: Option<String> = None;
    let mut expires_ms: u64 = 0;
    let mut max_age: Option<i64> = None;
    let mut secure = false;
    let mut http_only = false;
    let mut same_site = SameSite::Lax;

    for attr in parts {
        let (key, val) = attr.split_once('=').map(|(k, v)| (k, Some(v))).unwrap_or((attr, None));
        match key.trim().to_ascii_lowercase().as_str() {
            "domain" => domain = val.map(|v| v.trim().trim_start_matches('.').to_ascii_lowercase()),
            "path" => path = val.map(|v| v.trim().to_string()),
            "expires" => {
                if let Some(v) = val {
                    if let Ok(t) = httpdate::parse_http_date(v.trim()) {
                        expires_ms = t.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
                    }
                }
            }
            "max-age" => max_age = val.and_then(|v| v.trim().parse::<i64>().ok()),
            "secure" => secure = true,
            "httponly" => http_only = true,
            "samesite" => {
                same_site = match val.map(|v| v.trim().to_ascii_lowercase()) {
                    Some(ref s) if s == "strict" => SameSite::Strict,
                    Some(ref s) if s == "none" => SameSite::None,
                    _ => SameSite::Lax,
                };
            }
            _ => {}
        }
    }

    // Max-Age wins over Expires when both are present (spec §4.Q).
    if let Some(secs) = max_age {
        expires_ms = if secs <= 0 { 1 } else { now_ms() + (secs as u64) * 1000 };
    }

    let (domain, host_only) = match domain {
        Some(d) if !d.is_empty() => {
            let request_host_lower = request_host.to_ascii_lowercase();
            if d != request_host_lower && !request_host_lower.ends_with(&format!(".{d}")) {
                return None;
            }
            (d, false)
        }
        _ => (request_host.to_ascii_lowercase(), true),
    };

    let path = path.unwrap_or_else(|| default_path(request_path));

    Some(Cookie { name, value, domain, host_only, path, expires_ms, secure, http_only, same_site })
}

/// The default `Path` is the request URL's directory, i.e. everything up
/// to and including the last `/` (or `/` if there is none).
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => request_path[..i].to_string(),
    }
}

fn domain_matches(cookie_domain: &str, host: &str, host_only: bool) -> bool {
    let host = host.to_ascii_lowercase();
    if host_only {
        return host == cookie_domain;
    }
    host == cookie_domain || host.ends_with(&format!(".{cookie_domain}"))
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    if request_path.starts_with(cookie_path) {
        return cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/');
    }
    false
}

pub struct CookieJar {
    cookies: Mutex<Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self { cookies: Mutex::new(Vec::new()) }
    }

    /// Parses and stores a `Set-Cookie` header observed on a response to
    /// `url`. Returns `false` if the header was rejected (malformed, or a
    /// `Domain` attribute outside the request host's ownership).
    pub fn process_set_cookie(&self, url: &Url, header: &str) -> bool {
        let Some(host) = url.host_str() else { return false };
        let Some(cookie) = parse_set_cookie(host, url.path(), header) else { return false };

        let now = now_ms();
        let mut cookies = self.cookies.lock();
        cookies.retain(|c| !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path));

        if cookie.is_expired(now) {
            return true;
        }
        cookies.push(cookie);
        true
    }

    /// Builds the `Cookie:` header value for a request to `url`, in the
    /// jar's storage order. Returns `None` if no cookie applies.
    pub fn get_cookie_header(&self, url: &Url) -> Option<String> {
        let Some(host) = url.host_str() else { return None };
        let path = url.path();
        let is_secure = url.scheme() == "https";
        let now = now_ms();

        let cookies = self.cookies.lock();
        let matches: Vec<String> = cookies
            .iter()
            .filter(|c| !c.is_expired(now))
            .filter(|c| domain_matches(&c.domain, host, c.host_only))
            .filter(|c| path_matches(&c.path, path))
            .filter(|c| !c.secure || is_secure)
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if matches.is_empty() {
            None
        } else {
            Some(matches.join("; "))
        }
    }

    /// Drops every cookie whose `expires_ms` has passed; session cookies
    /// (`expires_ms == 0`) are never purged here.
    pub fn purge_expired(&self) {
        let now = now_ms();
        self.cookies.lock().retain(|c| !c.is_expired(now));
    }

    pub fn len(&self) -> usize {
        self.cookies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn host_only_cookie_is_sent_back_to_the_same_host() {
        let jar = CookieJar::new();
        jar.process_set_cookie(&url("https://example.com/a"), "a=1");
        assert_eq!(jar.get_cookie_header(&url("https://example.com/a")), Some("a=1".to_string()));
    }

    #[test]
    fn domain_cookie_is_sent_to_subdomains() {
        let jar = CookieJar::new();
        jar.process_set_cookie(&url("https://www.example.com/"), "a=1; Domain=example.com");
        assert_eq!(jar.get_cookie_header(&url("https://sub.example.com/")), Some("a=1".to_string()));
    }

    #[test]
    fn domain_attribute_outside_request_host_is_rejected() {
        let jar = CookieJar::new();
        let accepted = jar.process_set_cookie(&url("https://example.com/"), "a=1; Domain=evil.com");
        assert!(!accepted);
        assert!(jar.is_empty());
    }

    #[test]
    fn secure_cookie_is_withheld_from_plain_http() {
        let jar = CookieJar::new();
        jar.process_set_cookie(&url("https://example.com/"), "a=1; Secure");
        assert_eq!(jar.get_cookie_header(&url("http://example.com/")), None);
        assert_eq!(jar.get_cookie_header(&url("https://example.com/")), Some("a=1".to_string()));
    }

    #[test]
    fn path_prefix_must_respect_segment_boundary() {
        let jar = CookieJar::new();
        jar.process_set_cookie(&url("https://example.com/foo"), "a=1; Path=/foo");
        assert_eq!(jar.get_cookie_header(&url("https://example.com/foobar")), None);
        assert_eq!(jar.get_cookie_header(&url("https://example.com/foo/bar")), Some("a=1".to_string()));
    }

    #[test]
    fn max_age_wins_over_expires() {
        let jar = CookieJar::new();
        jar.process_set_cookie(
            &url("https://example.com/"),
            "a=1; Expires=Wed, 01 Jan 2000 00:00:00 GMT; Max-Age=3600",
        );
        assert_eq!(jar.get_cookie_header(&url("https://example.com/")), Some("a=1".to_string()));
    }

    #[test]
    fn upsert_replaces_existing_cookie_with_same_key() {
        let jar = CookieJar::new();
        jar.process_set_cookie(&url("https://example.com/"), "a=1");
        jar.process_set_cookie(&url("https://example.com/"), "a=2");
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get_cookie_header(&url("https://example.com/")), Some("a=2".to_string()));
    }

    #[test]
    fn zero_max_age_expires_the_cookie_immediately() {
        let jar = CookieJar::new();
        jar.process_set_cookie(&url("https://example.com/"), "a=1; Max-Age=0");
        assert_eq!(jar.get_cookie_header(&url("https://example.com/")), None);
    }
}
