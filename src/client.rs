//! The engine's single entry point (spec §6 "Exposed operations"):
//! resolves DNS, picks a reactor shard, opens (or accounts for) a pooled
//! `Connection`, and delivers a decompressed `Response` via callback.
//!
//! Grounded on the original `holytls` top-level client wiring described in
//! spec §4.N/§6; the callback shape mirrors `Connection::submit_request`'s
//! own `on_response`/`on_error` pair rather than introducing a new style.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use url::Url;

use crate::altsvc::{parse_alt_svc_header, AltSvcCache, AltSvcEndpoint};
use crate::config::{Config, ProtocolPreference, ProxyType};
use crate::connection::{Connection, ProxyTunnelKind, Response};
use crate::cookie::CookieJar;
use crate::decompress::{decompress_async, ContentEncoding, DecompressResult};
use crate::dns::{resolve_async, DnsCache};
use crate::error::{DnsError, HolyError, PoolError, RequestError};
use crate::fingerprint::FingerprintProfile;
use crate::http3::{self, Http3RequestParams};
use crate::pool::ConnectionPool;
use crate::proxy::{HttpConnectTunnel, SocksTunnel, SocksVariant};
use crate::reactor::{Handler, ReactorManager, ReactorPoster};
use crate::tls::SessionCache;
use mio::Interest;

pub type ResponseResult = Result<Response, HolyError>;

/// One engine instance: a sharded reactor pool plus the caches spec §5
/// calls out as the only cross-thread shared state (session cache, Alt-Svc
/// cache, cookie jar), and a per-host connection pool for accounting.
pub struct Client {
    config: Config,
    reactor: ReactorManager,
    pool: Arc<ConnectionPool<()>>,
    dns: DnsCache,
    alt_svc: Arc<AltSvcCache>,
    cookies: Arc<CookieJar>,
    session_cache: Arc<SessionCache>,
    profile: Arc<FingerprintProfile>,
}

impl Client {
    pub fn new(config: Config) -> io::Result<Self> {
        let num_shards = if config.threads.num_workers == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        } else {
            config.threads.num_workers
        };
        let profile = Arc::new(FingerprintProfile::chrome_143(config.tls.force_http1));
        let reactor = ReactorManager::spawn(num_shards)?;
        let pool = Arc::new(ConnectionPool::new(config.pool.max_connections_per_host));
        let dns = DnsCache::new(config.dns.cache_ttl);
        let session_cache = Arc::new(SessionCache::new(config.tls.session_cache_size));
        Ok(Self {
            reactor,
            pool,
            dns,
            alt_svc: Arc::new(AltSvcCache::new()),
            cookies: Arc::new(CookieJar::new()),
            session_cache,
            profile,
            config,
        })
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn alt_svc_cache(&self) -> &AltSvcCache {
        &self.alt_svc
    }

    pub fn get(&self, url: &str, on_response: impl FnOnce(ResponseResult) + Send + 'static) {
        self.request("GET", url, Vec::new(), Vec::new(), on_response);
    }

    /// Sends one HTTPS request. `custom_headers` are appended after the
    /// fixed Chrome sequence (spec §4.A); the `Cookie` header, if the jar
    /// has anything for this URL, is added automatically. The response
    /// body is auto-decompressed per `Content-Encoding` when
    /// `config.auto_decompress` is set.
    pub fn request(
        &self,
        method: &str,
        url: &str,
        custom_headers: Vec<(String, String)>,
        body: Vec<u8>,
        on_response: impl FnOnce(ResponseResult) + Send + 'static,
    ) {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => return on_response(Err(HolyError::Request(RequestError::InvalidUrl(e.to_string())))),
        };
        if parsed.scheme() != "https" {
            return on_response(Err(HolyError::Request(RequestError::InvalidUrl(
                "only https:// URLs are supported".to_string(),
            ))));
        }
        let Some(host) = parsed.host_str().map(str::to_string) else {
            return on_response(Err(HolyError::Request(RequestError::InvalidUrl("missing host".to_string()))));
        };
        let port = parsed.port_or_known_default().unwrap_or(443);
        let path = match parsed.query() {
            Some(q) => format!("{}?{q}", parsed.path()),
            None => parsed.path().to_string(),
        };

        let mut custom_headers = custom_headers;
        if let Some(cookie_header) = self.cookies.get_cookie_header(&parsed) {
            custom_headers.push(("Cookie".to_string(), cookie_header));
        }

        if !self.pool.has_capacity(&host, port) {
            tracing::warn!(%host, port, "connection pool exhausted");
            return on_response(Err(HolyError::Pool(PoolError::Exhausted {
                host,
                port,
                max_connections: self.config.pool.max_connections_per_host,
            })));
        }

        let method = method.to_string();
        let auto_decompress = self.config.auto_decompress;
        let cookies = self.cookies.clone();
        let alt_svc = self.alt_svc.clone();
        let pool = self.pool.clone();
        let profile = self.profile.clone();
        let session_cache = self.session_cache.clone();
        let proxy_cfg = self.config.proxy.clone();
        let response_url = parsed.clone();
        let poster = self.reactor.poster_for(&host, port).clone();
        let host_for_connect = host.clone();

        // Each request claims a TCP-connection-sized slot up front, before
        // ALPN/protocol negotiation is known; `max_streams: 1` is the safe
        // floor until connection reuse feeds a real stream count back in
        // (DESIGN.md Open Question #1).
        self.pool.register_new_in_use(&host, port, (), 1);

        let protocol_pref = self.config.protocol;
        let alt_svc_enabled = self.config.alt_svc_enabled;
        let connect_timeout = self.config.pool.connect_timeout;

        resolve_async(self.dns.clone(), poster.clone(), host.clone(), port, move |resolved| {
            let pool_guard = PoolGuard { pool: pool.clone(), host: host.clone(), port };

            let addrs = match resolved {
                Ok(addrs) if !addrs.is_empty() => addrs,
                Ok(_) => {
                    drop(pool_guard);
                    return on_response(Err(HolyError::Dns(DnsError::ResolutionFailed {
                        host: host.clone(),
                        source: io::Error::new(io::ErrorKind::NotFound, "resolver returned no addresses"),
                    })));
                }
                Err(e) => {
                    drop(pool_guard);
                    return on_response(Err(e));
                }
            };

            let h3_endpoint =
                select_http3_endpoint(protocol_pref, &alt_svc, alt_svc_enabled, &host_for_connect, port);

            if let Some(endpoint) = h3_endpoint {
                let h3_peer_addr = SocketAddr::new(addrs[0].ip(), endpoint.port);
                let authority =
                    if port == 443 { host_for_connect.clone() } else { format!("{host_for_connect}:{port}") };
                let params = Http3RequestParams {
                    method: method.clone(),
                    path: path.clone(),
                    authority,
                    custom_headers: custom_headers.clone(),
                    body: body.clone(),
                    is_navigation: true,
                    is_activated: true,
                };
                let force_http3 = matches!(protocol_pref, ProtocolPreference::Http3Only);
                let alt_svc_h3 = alt_svc.clone();
                let host_h3 = host_for_connect.clone();
                let poster_h3 = poster.clone();
                let response_url_h3 = response_url.clone();
                let cookies_h3 = cookies.clone();
                let alt_svc_cb_h3 = alt_svc.clone();

                http3::request_async(
                    poster.clone(),
                    profile.clone(),
                    host_for_connect.clone(),
                    h3_peer_addr,
                    params,
                    connect_timeout,
                    move |result| match result {
                        Ok(response) => {
                            alt_svc_h3.clear_http3_failure(&host_h3, port);
                            let (on_ok, _) = wrap_callbacks(
                                auto_decompress,
                                poster_h3,
                                response_url_h3,
                                cookies_h3,
                                alt_svc_cb_h3,
                                host_h3,
                                port,
                                pool_guard,
                                Box::new(on_response),
                            );
                            on_ok(response);
                        }
                        Err(e) => {
                            if force_http3 {
                                drop(pool_guard);
                                return on_response(Err(e));
                            }
                            tracing::debug!(host = %host_h3, port, error = %e, "HTTP/3 attempt failed, falling back to TCP");
                            alt_svc_h3.mark_http3_failed(&host_h3, port);
                            dispatch_over_tcp(TcpDispatchCtx {
                                addrs,
                                pool_guard,
                                proxy_cfg,
                                host_for_connect,
                                port,
                                profile,
                                session_cache,
                                method,
                                path,
                                custom_headers,
                                body,
                                auto_decompress,
                                poster: poster_h3,
                                response_url: response_url_h3,
                                cookies: cookies_h3,
                                alt_svc: alt_svc_cb_h3,
                                on_response: Box::new(on_response),
                            });
                        }
                    },
                );
                return;
            }

            dispatch_over_tcp(TcpDispatchCtx {
                addrs,
                pool_guard,
                proxy_cfg,
                host_for_connect,
                port,
                profile,
                session_cache,
                method,
                path,
                custom_headers,
                body,
                auto_decompress,
                poster,
                response_url,
                cookies,
                alt_svc,
                on_response: Box::new(on_response),
            });
        });
    }
}

/// Decides whether a request should attempt HTTP/3 before (or instead of)
/// the pooled TCP path (spec §4.I addendum, §4.L–M protocol selection).
/// `Http1Only` never attempts it; `Http3Only` forces an attempt against
/// the origin itself with no Alt-Svc lookup; `Auto`/`Http2Preferred` only
/// attempt it when the origin has a live Alt-Svc advertisement for itself
/// (an advertisement naming a different host is left for a future
/// cross-host HTTP/3 connection, not implemented here — see DESIGN.md).
fn select_http3_endpoint(
    protocol: ProtocolPreference,
    alt_svc: &AltSvcCache,
    alt_svc_enabled: bool,
    host: &str,
    port: u16,
) -> Option<AltSvcEndpoint> {
    match protocol {
        ProtocolPreference::Http1Only => None,
        ProtocolPreference::Http3Only => Some(AltSvcEndpoint { host: host.to_string(), port }),
        ProtocolPreference::Auto | ProtocolPreference::Http2Preferred => {
            if !alt_svc_enabled {
                return None;
            }
            alt_svc.get_http3_endpoint(host, port).filter(|e| e.host == host)
        }
    }
}

struct TcpDispatchCtx {
    addrs: Vec<SocketAddr>,
    pool_guard: PoolGuard,
    proxy_cfg: crate::config::ProxyConfig,
    host_for_connect: String,
    port: u16,
    profile: Arc<FingerprintProfile>,
    session_cache: Arc<SessionCache>,
    method: String,
    path: String,
    custom_headers: Vec<(String, String)>,
    body: Vec<u8>,
    auto_decompress: bool,
    poster: ReactorPoster,
    response_url: Url,
    cookies: Arc<CookieJar>,
    alt_svc: Arc<AltSvcCache>,
    on_response: Box<dyn FnOnce(ResponseResult) + Send>,
}

/// The pooled TCP connect path (HTTP/2 or HTTP/1.1, negotiated by ALPN):
/// opens a `Connection` (directly or through a configured proxy tunnel),
/// submits the request, and registers the connection on the reactor shard
/// that resolved it. This is the fallback for every HTTP/3 failure and
/// the sole path whenever HTTP/3 isn't in play at all.
fn dispatch_over_tcp(ctx: TcpDispatchCtx) {
    let TcpDispatchCtx {
        addrs,
        pool_guard,
        proxy_cfg,
        host_for_connect,
        port,
        profile,
        session_cache,
        method,
        path,
        custom_headers,
        body,
        auto_decompress,
        poster,
        response_url,
        cookies,
        alt_svc,
        on_response,
    } = ctx;

    let proxy_tunnel = build_proxy_tunnel(&proxy_cfg, &host_for_connect, port);
    let peer_addr = match &proxy_tunnel {
        Some(_) => match proxy_cfg.host.as_deref().zip(proxy_cfg.port) {
            Some((h, p)) => match (h, p).to_socket_addrs_first() {
                Some(a) => a,
                None => {
                    drop(pool_guard);
                    return on_response(Err(HolyError::Request(RequestError::InvalidUrl(
                        "invalid proxy address".to_string(),
                    ))));
                }
            },
            None => {
                drop(pool_guard);
                return on_response(Err(HolyError::Request(RequestError::InvalidUrl(
                    "proxy configured without host/port".to_string(),
                ))));
            }
        },
        None => addrs[0],
    };

    let conn = match Connection::connect(peer_addr, host_for_connect.clone(), port, profile, session_cache, proxy_tunnel) {
        Ok(c) => c,
        Err(e) => {
            drop(pool_guard);
            return on_response(Err(e));
        }
    };

    let (on_ok, on_err) =
        wrap_callbacks(auto_decompress, poster.clone(), response_url, cookies, alt_svc, host_for_connect, port, pool_guard, on_response);

    let mut conn = conn;
    conn.submit_request(method, path, custom_headers, body, true, true, on_ok, on_err);

    let _ = poster.post(move |handle| {
        let mut boxed: Box<Connection> = Box::new(conn);
        // `boxed`'s heap allocation doesn't move even though the
        // `Box` handle itself is about to be moved into the
        // registry as a `Box<dyn Handler>`; borrow the socket
        // through a raw pointer so both can be handed to
        // `register` in the same call.
        let socket_ptr: *mut _ = boxed.socket_mut();
        let source: &mut dyn mio::event::Source = unsafe { &mut *socket_ptr };
        if handle.register(source, Interest::READABLE | Interest::WRITABLE, boxed as Box<dyn Handler>).is_err() {
            return;
        }
    });
}

/// Keeps the pool's in-use accounting balanced: decrements exactly once,
/// whenever the in-flight attempt this guard was created for ends (success,
/// failure, or an early return before a `Connection` even exists).
struct PoolGuard {
    pool: Arc<ConnectionPool<()>>,
    host: String,
    port: u16,
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        self.pool.remove_in_use(&self.host, self.port);
    }
}

fn build_proxy_tunnel(proxy_cfg: &crate::config::ProxyConfig, target_host: &str, target_port: u16) -> Option<ProxyTunnelKind> {
    match proxy_cfg.proxy_type {
        ProxyType::None => None,
        ProxyType::Http => Some(ProxyTunnelKind::HttpConnect(HttpConnectTunnel::new(
            target_host,
            target_port,
            proxy_cfg.username.clone(),
            proxy_cfg.password.clone(),
        ))),
        ProxyType::Socks4 => Some(ProxyTunnelKind::Socks(SocksTunnel::new(
            SocksVariant::V4,
            target_host,
            target_port,
            proxy_cfg.username.clone(),
            proxy_cfg.password.clone(),
        ))),
        ProxyType::Socks4a => Some(ProxyTunnelKind::Socks(SocksTunnel::new(
            SocksVariant::V4a,
            target_host,
            target_port,
            proxy_cfg.username.clone(),
            proxy_cfg.password.clone(),
        ))),
        ProxyType::Socks5 => Some(ProxyTunnelKind::Socks(SocksTunnel::new(
            SocksVariant::V5,
            target_host,
            target_port,
            proxy_cfg.username.clone(),
            proxy_cfg.password.clone(),
        ))),
        ProxyType::Socks5h => Some(ProxyTunnelKind::Socks(SocksTunnel::new(
            SocksVariant::V5h,
            target_host,
            target_port,
            proxy_cfg.username.clone(),
            proxy_cfg.password.clone(),
        ))),
    }
}

/// Wraps the caller's `on_response` so a successful body is decompressed
/// per `Content-Encoding` (spec §4.R), any `Set-Cookie` headers are stored
/// (spec §4.Q), and an `Alt-Svc` header advertising HTTP/3 is recorded in
/// the origin's cache (spec §4.I addendum) before the caller ever sees
/// the response.
fn wrap_callbacks(
    auto_decompress: bool,
    poster: crate::reactor::ReactorPoster,
    url: Url,
    cookies: Arc<CookieJar>,
    alt_svc: Arc<AltSvcCache>,
    origin_host: String,
    origin_port: u16,
    guard: PoolGuard,
    on_response: Box<dyn FnOnce(ResponseResult) + Send>,
) -> (crate::connection::ResponseCallback, crate::connection::ErrorCallback) {
    let guard = Arc::new(std::sync::Mutex::new(Some(guard)));
    let guard_err = guard.clone();

    let on_ok: crate::connection::ResponseCallback = Box::new(move |mut response: Response| {
        let _ = guard.lock().map(|mut g| g.take());
        for (name, value) in &response.headers {
            if name.eq_ignore_ascii_case("set-cookie") {
                cookies.process_set_cookie(&url, value);
            }
            if name.eq_ignore_ascii_case("alt-svc") {
                if let Some((endpoint, max_age)) = parse_alt_svc_header(value, &origin_host) {
                    alt_svc.record_advertisement(&origin_host, origin_port, endpoint, max_age);
                }
            }
        }
        if !auto_decompress {
            return on_response(Ok(response));
        }
        let encoding = response
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-encoding"))
            .map(|(_, v)| ContentEncoding::from_header_value(v))
            .unwrap_or(ContentEncoding::Identity);
        if matches!(encoding, ContentEncoding::Identity) {
            return on_response(Ok(response));
        }
        let body = std::mem::take(&mut response.body);
        decompress_async(poster, encoding, body, move |result| {
            response.body = match result {
                DecompressResult::Ok(bytes) => bytes,
                DecompressResult::Fallback(bytes) => bytes,
            };
            on_response(Ok(response));
        });
    });

    let on_err: crate::connection::ErrorCallback = Box::new(move |err| {
        let _ = guard_err.lock().map(|mut g| g.take());
        on_response(Err(err));
    });

    (on_ok, on_err)
}

/// Tiny local helper so `build_proxy_tunnel`'s caller doesn't need a whole
/// extra DNS round trip just to reach the proxy itself.
trait FirstSocketAddr {
    fn to_socket_addrs_first(&self) -> Option<std::net::SocketAddr>;
}

impl FirstSocketAddr for (&str, u16) {
    fn to_socket_addrs_first(&self) -> Option<std::net::SocketAddr> {
        use std::net::ToSocketAddrs;
        (self.0, self.1).to_socket_addrs().ok()?.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_https_urls() {
        let client = Client::new(Config::default()).expect("client construction");
        let (tx, rx) = std::sync::mpsc::channel();
        client.get("http://example.com/", move |result| {
            let _ = tx.send(result);
        });
        let result = rx.recv_timeout(std::time::Duration::from_secs(1)).expect("callback fires synchronously");
        assert!(matches!(result, Err(HolyError::Request(RequestError::InvalidUrl(_)))));
    }

    #[test]
    fn rejects_malformed_urls() {
        let client = Client::new(Config::default()).expect("client construction");
        let (tx, rx) = std::sync::mpsc::channel();
        client.get("not a url", move |result| {
            let _ = tx.send(result);
        });
        let result = rx.recv_timeout(std::time::Duration::from_secs(1)).expect("callback fires synchronously");
        assert!(matches!(result, Err(HolyError::Request(RequestError::InvalidUrl(_)))));
    }

    #[test]
    fn http1_only_never_attempts_http3_even_with_an_advertisement() {
        let alt_svc = AltSvcCache::new();
        alt_svc.record_advertisement(
            "example.com",
            443,
            AltSvcEndpoint { host: "example.com".to_string(), port: 443 },
            std::time::Duration::from_secs(3600),
        );
        assert!(select_http3_endpoint(ProtocolPreference::Http1Only, &alt_svc, true, "example.com", 443).is_none());
    }

    #[test]
    fn http3_only_forces_an_attempt_without_an_advertisement() {
        let alt_svc = AltSvcCache::new();
        let endpoint = select_http3_endpoint(ProtocolPreference::Http3Only, &alt_svc, true, "example.com", 443);
        assert_eq!(endpoint.map(|e| e.port), Some(443));
    }

    #[test]
    fn auto_only_attempts_http3_when_alt_svc_enabled_and_advertised() {
        let alt_svc = AltSvcCache::new();
        assert!(select_http3_endpoint(ProtocolPreference::Auto, &alt_svc, true, "example.com", 443).is_none());

        alt_svc.record_advertisement(
            "example.com",
            443,
            AltSvcEndpoint { host: "example.com".to_string(), port: 443 },
            std::time::Duration::from_secs(3600),
        );
        assert!(select_http3_endpoint(ProtocolPreference::Auto, &alt_svc, true, "example.com", 443).is_some());
        assert!(
            select_http3_endpoint(ProtocolPreference::Auto, &alt_svc, false, "example.com", 443).is_none(),
            "disabling alt_svc_enabled must suppress the HTTP/3 attempt even with a live advertisement"
        );
    }

    #[test]
    fn advertisement_naming_a_different_host_is_not_attempted() {
        let alt_svc = AltSvcCache::new();
        alt_svc.record_advertisement(
            "example.com",
            443,
            AltSvcEndpoint { host: "h3.example.net".to_string(), port: 443 },
            std::time::Duration::from_secs(3600),
        );
        assert!(select_http3_endpoint(ProtocolPreference::Auto, &alt_svc, true, "example.com", 443).is_none());
    }
}
