//! The per-TCP-flow `Connection` state machine (spec §4.K): composes the
//! reactor registration, `TlsConnection`, an HTTP/1.1 or HTTP/2 session,
//! and an optional proxy tunnel into the state diagram
//! `Connecting -> ProxyTunnel? -> TlsHandshake -> Connected`.
//!
//! Grounded on the original `holytls` `src/holytls/core/connection.cc`.
//! HTTP/3 runs over a separate, UDP-based driver (`http3::request_async`,
//! layering `http3::H3Session` over `http3::QuicConnection`); this type is
//! TCP-only, matching spec §2's component table ("Composes D+E+G+H+J for
//! one TCP flow").

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use mio::net::TcpStream;
use mio::Token;

use crate::error::{HolyError, RequestError};
use crate::fingerprint::{build_h1_headers, build_h2_headers, FingerprintProfile, HighEntropyHints, RequestContext};
use crate::http1::{Http1Session, State as Http1State};
use crate::http2::Http2Session;
use crate::proxy::{HttpConnectTunnel, SocksTunnel};
use crate::reactor::{Handler, ReactorHandle};
use crate::tls::{SessionCache, StepOutcome as TlsStepOutcome, TlsConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    ProxyTunnel,
    TlsHandshake,
    Connected,
    Closing,
    Closed,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub type ResponseCallback = Box<dyn FnOnce(Response) + Send>;
pub type ErrorCallback = Box<dyn FnOnce(HolyError) + Send>;

pub struct PendingRequest {
    pub method: String,
    pub path: String,
    pub custom_headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub is_navigation: bool,
    pub is_activated: bool,
    pub on_response: ResponseCallback,
    pub on_error: ErrorCallback,
}

struct ActiveRequest {
    on_response: ResponseCallback,
    on_error: ErrorCallback,
}

pub enum ProxyTunnelKind {
    HttpConnect(HttpConnectTunnel),
    Socks(SocksTunnel),
}

impl ProxyTunnelKind {
    fn initial_bytes(&mut self) -> Vec<u8> {
        match self {
            ProxyTunnelKind::HttpConnect(t) => t.request_bytes(),
            ProxyTunnelKind::Socks(t) => t.initial_bytes(),
        }
    }

    fn on_readable(&mut self, data: &[u8]) -> Result<bool, HolyError> {
        match self {
            ProxyTunnelKind::HttpConnect(t) => t.on_readable(data),
            ProxyTunnelKind::Socks(t) => t.on_readable(data),
        }
    }
}

enum ProtocolSession {
    Http1(Http1Session),
    Http2(Box<Http2Session>),
}

/// One TCP (+ optional proxy, + optional TLS) flow, owned and driven
/// exclusively by its reactor's thread (spec §5 "Scheduling model").
pub struct Connection {
    socket: TcpStream,
    token: Option<Token>,
    state: ConnState,
    profile: Arc<FingerprintProfile>,
    session_cache: Arc<SessionCache>,
    target_host: String,
    target_port: u16,

    proxy: Option<ProxyTunnelKind>,
    tls: Option<TlsConnection>,
    session: Option<ProtocolSession>,

    pending: VecDeque<PendingRequest>,
    active_http1: Option<(u32, ActiveRequest)>,
    active_http2: HashMap<u32, ActiveRequest>,
    next_http1_id: u32,

    write_buf: Vec<u8>,
    created_at: Instant,
    last_used_at: Instant,
}

impl Connection {
    /// Begins connecting to `peer_addr` (which is the proxy's address if
    /// `proxy` is set, otherwise `target_host:target_port` directly).
    pub fn connect(
        peer_addr: std::net::SocketAddr,
        target_host: String,
        target_port: u16,
        profile: Arc<FingerprintProfile>,
        session_cache: Arc<SessionCache>,
        proxy: Option<ProxyTunnelKind>,
    ) -> Result<Self, HolyError> {
        let socket = TcpStream::connect(peer_addr).map_err(|e| HolyError::Transport(crate::error::TransportError::Io(e)))?;
        let state = if proxy.is_some() { ConnState::ProxyTunnel } else { ConnState::TlsHandshake };
        let mut conn = Self {
            socket,
            token: None,
            state,
            profile,
            session_cache,
            target_host,
            target_port,
            proxy,
            tls: None,
            session: None,
            pending: VecDeque::new(),
            active_http1: None,
            active_http2: HashMap::new(),
            next_http1_id: 1,
            write_buf: Vec::new(),
            created_at: Instant::now(),
            last_used_at: Instant::now(),
        };
        if conn.proxy.is_none() {
            conn.begin_tls_handshake()?;
        }
        Ok(conn)
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn socket_mut(&mut self) -> &mut TcpStream {
        &mut self.socket
    }

    pub fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    /// True iff a new request can be handed to this connection right now
    /// (spec §4.K "Connection reuse gate").
    pub fn can_submit_request(&self) -> bool {
        match (&self.state, &self.session) {
            (ConnState::Connected, Some(ProtocolSession::Http1(s))) => s.state() == Http1State::Idle,
            (ConnState::Connected, Some(ProtocolSession::Http2(s))) => s.goaway_received().is_none(),
            _ => false,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.active_http1.is_none() && self.active_http2.is_empty() && self.pending.is_empty()
    }

    pub fn max_concurrent_streams(&self) -> usize {
        match &self.session {
            Some(ProtocolSession::Http1(_)) => 1,
            Some(ProtocolSession::Http2(_)) => 100,
            None => 0,
        }
    }

    pub fn is_http2(&self) -> bool {
        matches!(self.session, Some(ProtocolSession::Http2(_)))
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    /// Queues a request; it is sent immediately if `Connected`, otherwise
    /// replayed once the handshake sequence finishes. Header sequencing is
    /// deferred to dispatch time, since HTTP/1.1 and HTTP/2 use different
    /// orders (spec §4.A) and the protocol isn't known until ALPN resolves.
    pub fn submit_request(
        &mut self,
        method: String,
        path: String,
        custom_headers: Vec<(String, String)>,
        body: Vec<u8>,
        is_navigation: bool,
        is_activated: bool,
        on_response: ResponseCallback,
        on_error: ErrorCallback,
    ) {
        let request =
            PendingRequest { method, path, custom_headers, body, is_navigation, is_activated, on_response, on_error };
        if self.can_submit_request() {
            self.dispatch_request(request);
        } else {
            self.pending.push_back(request);
        }
    }

    /// This connection's `Host`/`:authority` value: bare host, with an
    /// explicit port only when it isn't the HTTPS default.
    fn authority(&self) -> String {
        if self.target_port == 443 {
            self.target_host.clone()
        } else {
            format!("{}:{}", self.target_host, self.target_port)
        }
    }

    fn dispatch_request(&mut self, request: PendingRequest) {
        self.last_used_at = Instant::now();
        let authority = self.authority();
        let user_agent = self.profile.user_agent("Windows NT 10.0; Win64; x64");
        let (sec_fetch_site, sec_fetch_mode, sec_fetch_dest) = if request.is_navigation {
            ("none", "navigate", "document")
        } else {
            ("same-origin", "cors", "empty")
        };
        let ctx = RequestContext {
            method: &request.method,
            authority: &authority,
            scheme: "https",
            path: &request.path,
            platform: "Windows",
            user_agent: &user_agent,
            accept: crate::fingerprint::chrome::DEFAULT_ACCEPT,
            accept_encoding: crate::fingerprint::chrome::DEFAULT_ACCEPT_ENCODING,
            accept_language: crate::fingerprint::chrome::DEFAULT_ACCEPT_LANGUAGE,
            is_navigation: request.is_navigation,
            is_activated: request.is_activated,
            sec_fetch_site,
            sec_fetch_mode,
            sec_fetch_dest,
            high_entropy_hints: HighEntropyHints::default(),
            custom_headers: &request.custom_headers,
        };

        match self.session.as_mut() {
            Some(ProtocolSession::Http1(session)) => {
                let headers = build_h1_headers(&ctx, &self.profile.sec_ch_ua);
                let bytes = Http1Session::serialize_request(&request.method, &request.path, &headers, &request.body);
                self.write_buf.extend_from_slice(&bytes);
                session.begin_response();
                let id = self.next_http1_id;
                self.next_http1_id += 1;
                self.active_http1 = Some((id, ActiveRequest { on_response: request.on_response, on_error: request.on_error }));
            }
            Some(ProtocolSession::Http2(session)) => {
                let headers = build_h2_headers(&ctx, &self.profile.sec_ch_ua);
                let (stream_id, bytes) = session.submit_request(&headers, &request.body);
                self.write_buf.extend_from_slice(&bytes);
                self.active_http2.insert(stream_id, ActiveRequest { on_response: request.on_response, on_error: request.on_error });
            }
            None => {
                (request.on_error)(HolyError::Request(RequestError::Cancelled));
            }
        }
    }

    /// Dispatches queued requests while the protocol session can still
    /// accept one. HTTP/1.1 allows only a single request in flight, so
    /// this stops after the first dispatch there; HTTP/2 keeps draining
    /// since every queued request opens its own stream.
    fn replay_pending(&mut self) {
        while self.can_submit_request() {
            let Some(request) = self.pending.pop_front() else { break };
            self.dispatch_request(request);
        }
    }

    fn fail_all(&mut self, err: HolyError) {
        tracing::debug!(host = %self.target_host, port = self.target_port, %err, "connection failed, broadcasting to all requests");
        self.state = ConnState::Error;
        if let Some((_, req)) = self.active_http1.take() {
            (req.on_error)(err.broadcast_copy());
        }
        for (_, req) in self.active_http2.drain() {
            (req.on_error)(err.broadcast_copy());
        }
        for req in self.pending.drain(..) {
            (req.on_error)(err.broadcast_copy());
        }
    }

    fn begin_tls_handshake(&mut self) -> Result<(), HolyError> {
        let tls = TlsConnection::new(&self.profile, &self.target_host, self.target_port, &self.session_cache)?;
        self.tls = Some(tls);
        self.state = ConnState::TlsHandshake;
        Ok(())
    }

    fn on_tls_connected(&mut self) {
        // Marks this origin as seen so the next connection attempt passes
        // a ticket hint into `RustlsEngine::new`, which keeps its cached
        // `ClientConfig` (and rustls' internal resumption store) alive
        // across reconnects (spec §4.F).
        if let Some(tls) = self.tls.as_ref() {
            tls.store_session(
                &self.session_cache,
                crate::tls::SessionTicket { data: Vec::new(), supports_early_data: false },
            );
        }

        let alpn = self.tls.as_ref().and_then(|t| t.negotiated_alpn());
        let is_h2 = alpn.as_deref() == Some(b"h2");

        if is_h2 {
            let mut session = Http2Session::new(&self.profile);
            let opening = session.opening_bytes(&self.profile);
            if let Some(tls) = self.tls.as_mut() {
                let _ = tls.submit_plaintext(&opening);
                self.write_buf.extend(tls.take_outgoing());
            }
            self.session = Some(ProtocolSession::Http2(Box::new(session)));
        } else {
            self.session = Some(ProtocolSession::Http1(Http1Session::new()));
        }

        self.state = ConnState::Connected;
        self.replay_pending();
    }

    fn handle_plaintext(&mut self, data: Vec<u8>) {
        match self.session.as_mut() {
            Some(ProtocolSession::Http1(session)) => {
                match session.feed(&data) {
                    Ok(Some(response)) => {
                        if let Some((_, req)) = self.active_http1.take() {
                            (req.on_response)(Response { status: response.status, headers: response.headers, body: response.body });
                        }
                        // The session just returned to `Idle`; dispatch anything
                        // queued behind this request (no HTTP/1.1 pipelining).
                        self.replay_pending();
                    }
                    Ok(None) => {}
                    Err(e) => {
                        if let Some((_, req)) = self.active_http1.take() {
                            (req.on_error)(e);
                        }
                    }
                }
            }
            Some(ProtocolSession::Http2(session)) => match session.on_readable(&data) {
                Ok((outgoing, updated)) => {
                    self.write_buf.extend(outgoing);
                    for stream_id in updated {
                        if let Some(resp) = session.take_response_if_complete(stream_id) {
                            if let Some(req) = self.active_http2.remove(&stream_id) {
                                (req.on_response)(Response { status: resp.status, headers: resp.headers, body: resp.body });
                            }
                        }
                    }
                }
                Err(e) => self.fail_all(e),
            },
            None => {}
        }
    }
}

impl Handler for Connection {
    fn on_readable(&mut self, reactor: &mut ReactorHandle<'_>) {
        let _ = reactor.now_ms();
        let mut buf = [0u8; 16 * 1024];
        let n = match self.socket.read(&mut buf) {
            Ok(0) => {
                self.fail_all(HolyError::Transport(crate::error::TransportError::Reset {
                    addr: format!("{}:{}", self.target_host, self.target_port),
                }));
                self.state = ConnState::Closed;
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) => {
                self.fail_all(HolyError::Transport(crate::error::TransportError::Io(e)));
                return;
            }
        };
        let data = &buf[..n];

        match self.state {
            ConnState::ProxyTunnel => {
                let Some(proxy) = self.proxy.as_mut() else { return };
                match proxy.on_readable(data) {
                    Ok(true) => {
                        if let Err(e) = self.begin_tls_handshake() {
                            self.fail_all(e);
                        }
                    }
                    Ok(false) => {}
                    Err(e) => self.fail_all(e),
                }
            }
            ConnState::TlsHandshake | ConnState::Connected => {
                let Some(tls) = self.tls.as_mut() else { return };
                match tls.on_readable(data) {
                    TlsStepOutcome::HandshakeComplete => {
                        self.on_tls_connected();
                        let plaintext = self.tls.as_mut().unwrap().take_incoming_plaintext();
                        if !plaintext.is_empty() {
                            self.handle_plaintext(plaintext);
                        }
                    }
                    TlsStepOutcome::Continue | TlsStepOutcome::NeedMoreData => {
                        let plaintext = tls.take_incoming_plaintext();
                        if !plaintext.is_empty() {
                            self.handle_plaintext(plaintext);
                        }
                    }
                    TlsStepOutcome::Closed => self.state = ConnState::Closed,
                    TlsStepOutcome::Error(e) => self.fail_all(e),
                }
            }
            _ => {}
        }
    }

    fn on_writable(&mut self, _reactor: &mut ReactorHandle<'_>) {
        if self.write_buf.is_empty() {
            if let Some(proxy) = self.proxy.as_mut() {
                if self.state == ConnState::ProxyTunnel {
                    self.write_buf.extend(proxy.initial_bytes());
                }
            }
        }
        if let Some(tls) = self.tls.as_mut() {
            if !self.write_buf.is_empty() {
                let _ = tls.submit_plaintext(&std::mem::take(&mut self.write_buf));
            }
            let mut ciphertext = Vec::new();
            tls.on_writable(&mut ciphertext);
            self.write_buf.extend(ciphertext);
            self.write_buf.extend(tls.take_outgoing());
        }
        if self.write_buf.is_empty() {
            return;
        }
        match self.socket.write(&self.write_buf) {
            Ok(n) => {
                self.write_buf.drain(..n);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => self.fail_all(HolyError::Transport(crate::error::TransportError::Io(e))),
        }
    }

    fn on_error(&mut self, err: std::io::Error) {
        self.fail_all(HolyError::Transport(crate::error::TransportError::Io(err)));
        self.state = ConnState::Closed;
    }
}

impl HolyError {
    /// Produces an independent error carrying the same message, for
    /// fan-out to every request on a failed connection (spec §4.K
    /// "on_close": one connection failure becomes one error delivered to
    /// every active and queued request). `HolyError` itself isn't `Clone`
    /// since some variants wrap a non-`Clone` `io::Error`.
    fn broadcast_copy(&self) -> HolyError {
        HolyError::Internal(crate::error::InternalError::Bug(self.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn new_cache() -> Arc<SessionCache> {
        Arc::new(SessionCache::new(64))
    }

    #[test]
    fn new_connection_without_proxy_starts_in_tls_handshake() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let profile = Arc::new(FingerprintProfile::chrome_143(false));
        let conn = Connection::connect(addr, "example.com".to_string(), 443, profile, new_cache(), None).unwrap();
        assert_eq!(conn.state(), ConnState::TlsHandshake);
    }

    #[test]
    fn new_connection_with_proxy_starts_in_proxy_tunnel_state() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let profile = Arc::new(FingerprintProfile::chrome_143(false));
        let proxy = ProxyTunnelKind::HttpConnect(HttpConnectTunnel::new("example.com", 443, None, None));
        let conn = Connection::connect(addr, "example.com".to_string(), 443, profile, new_cache(), Some(proxy)).unwrap();
        assert_eq!(conn.state(), ConnState::ProxyTunnel);
    }

    #[test]
    fn cannot_submit_before_connected() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let profile = Arc::new(FingerprintProfile::chrome_143(false));
        let conn = Connection::connect(addr, "example.com".to_string(), 443, profile, new_cache(), None).unwrap();
        assert!(!conn.can_submit_request());
    }

    #[test]
    fn is_idle_true_for_a_fresh_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let profile = Arc::new(FingerprintProfile::chrome_143(false));
        let conn = Connection::connect(addr, "example.com".to_string(), 443, profile, new_cache(), None).unwrap();
        assert!(conn.is_idle());
    }
}
