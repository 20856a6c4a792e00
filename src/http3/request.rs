//! Off-loop HTTP/3 request attempt (spec §4.I, §4.L–M protocol selection).
//!
//! QUIC's handshake/request loop is a tight send/recv/timer cycle driven
//! by UDP datagrams rather than the byte-stream readiness `reactor::Handler`
//! is shaped around, and `quiche` needs its own timer serviced between
//! reads with no natural mio event to hang that off of. So, the same way
//! `dns::resolve_async` offloads a blocking `getaddrinfo` call, one HTTP/3
//! attempt runs start-to-finish on a `rayon` worker thread against a plain
//! blocking `std::net::UdpSocket`, and the result is posted back onto the
//! caller's reactor shard. `Client::request` uses this for the HTTP/3 leg
//! and falls back to the pooled TCP `Connection` path (HTTP/2 or HTTP/1.1)
//! whenever it errors out — see `client.rs`.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::connection::Response;
use crate::error::{HolyError, TlsError, TransportError};
use crate::fingerprint::{build_h2_headers, FingerprintProfile, HighEntropyHints, RequestContext};
use crate::reactor::ReactorPoster;

use super::h3_session::H3Session;
use super::quic_connection::QuicConnection;

const MAX_DATAGRAM_SIZE: usize = 1452;
/// How long to wait for a readable datagram before re-checking quiche's
/// timer and the overall deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Http3RequestParams {
    pub method: String,
    pub path: String,
    pub authority: String,
    pub custom_headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub is_navigation: bool,
    pub is_activated: bool,
}

/// Attempts one request entirely over HTTP/3 against `peer_addr`. Runs on
/// a rayon worker thread; `on_done` fires back on `poster`'s reactor shard
/// with `Ok(Response)` or `Err(HolyError)` — any handshake, transport, or
/// protocol failure is the caller's cue to fall back to HTTP/2/1.1.
pub fn request_async(
    poster: ReactorPoster,
    profile: Arc<FingerprintProfile>,
    server_name: String,
    peer_addr: SocketAddr,
    params: Http3RequestParams,
    handshake_timeout: Duration,
    on_done: impl FnOnce(Result<Response, HolyError>) + Send + 'static,
) {
    rayon::spawn(move || {
        let result = run_request(&profile, &server_name, peer_addr, &params, handshake_timeout);
        let _ = poster.post(move |_handle| on_done(result));
    });
}

fn run_request(
    profile: &FingerprintProfile,
    server_name: &str,
    peer_addr: SocketAddr,
    params: &Http3RequestParams,
    handshake_timeout: Duration,
) -> Result<Response, HolyError> {
    let bind_addr: SocketAddr = if peer_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }
        .parse()
        .expect("hardcoded unspecified address parses");
    let socket = UdpSocket::bind(bind_addr).map_err(|e| HolyError::Transport(TransportError::Io(e)))?;
    socket.connect(peer_addr).map_err(|e| HolyError::Transport(TransportError::Io(e)))?;
    let local_addr = socket.local_addr().map_err(|e| HolyError::Transport(TransportError::Io(e)))?;
    socket
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(|e| HolyError::Transport(TransportError::Io(e)))?;

    let mut quic = QuicConnection::connect(server_name, local_addr, peer_addr, profile)?;
    let deadline = Instant::now() + handshake_timeout;

    let mut out = [0u8; MAX_DATAGRAM_SIZE];
    flush_outgoing(&socket, &mut quic, &mut out)?;

    let mut h3: Option<H3Session> = None;
    let mut stream_id: Option<u64> = None;
    let mut recv_buf = [0u8; 65_535];

    loop {
        if Instant::now() >= deadline {
            return Err(HolyError::Tls(TlsError::HandshakeFailed {
                host: server_name.to_string(),
                reason: "HTTP/3 attempt timed out".to_string(),
            }));
        }

        match socket.recv(&mut recv_buf) {
            Ok(n) => quic.on_datagram(&mut recv_buf[..n])?,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                if matches!(quic.timeout(), Some(t) if t.is_zero()) {
                    quic.on_timeout();
                }
            }
            Err(e) => return Err(HolyError::Transport(TransportError::Io(e))),
        }

        if quic.is_closed() {
            return Err(HolyError::Tls(TlsError::HandshakeFailed {
                host: server_name.to_string(),
                reason: "QUIC connection closed before the request completed".to_string(),
            }));
        }

        if h3.is_none() && quic.is_established() {
            h3 = Some(H3Session::new(&mut quic)?);
        }

        if let Some(session) = h3.as_mut() {
            if stream_id.is_none() {
                let ctx = RequestContext {
                    method: &params.method,
                    authority: &params.authority,
                    scheme: "https",
                    path: &params.path,
                    platform: "Windows",
                    user_agent: &profile.user_agent("Windows NT 10.0; Win64; x64"),
                    accept: crate::fingerprint::chrome::DEFAULT_ACCEPT,
                    accept_encoding: crate::fingerprint::chrome::DEFAULT_ACCEPT_ENCODING,
                    accept_language: crate::fingerprint::chrome::DEFAULT_ACCEPT_LANGUAGE,
                    is_navigation: params.is_navigation,
                    is_activated: params.is_activated,
                    sec_fetch_site: if params.is_navigation { "none" } else { "same-origin" },
                    sec_fetch_mode: if params.is_navigation { "navigate" } else { "cors" },
                    sec_fetch_dest: if params.is_navigation { "document" } else { "empty" },
                    high_entropy_hints: HighEntropyHints::default(),
                    custom_headers: &params.custom_headers,
                };
                let headers = build_h2_headers(&ctx, &profile.sec_ch_ua);
                // A body-carrying request still opens its stream here but
                // rides no DATA frame after it — quiche's `h3::send_body`
                // path isn't wired up yet (see DESIGN.md); today only
                // empty-body requests (GET, HEAD) get a correct HTTP/3 leg.
                stream_id = Some(session.submit_request(&mut quic, &headers, params.body.is_empty())?);
            }

            flush_outgoing(&socket, &mut quic, &mut out)?;

            let updated = session.poll_events(&mut quic)?;
            if let Some(id) = stream_id {
                if updated.contains(&id) {
                    if let Some(resp) = session.take_response_if_complete(id) {
                        return Ok(Response { status: resp.status, headers: resp.headers, body: resp.body });
                    }
                }
            }
        }

        flush_outgoing(&socket, &mut quic, &mut out)?;
    }
}

fn flush_outgoing(socket: &UdpSocket, quic: &mut QuicConnection, out: &mut [u8]) -> Result<(), HolyError> {
    while let Some(len) = quic.send(out)? {
        socket.send(&out[..len]).map_err(|e| HolyError::Transport(TransportError::Io(e)))?;
    }
    Ok(())
}
