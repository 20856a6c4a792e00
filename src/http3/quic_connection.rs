//! QUIC transport wrapper around `quiche::Connection` (spec §4.I).
//!
//! The reactor hands this type UDP datagrams as they arrive and polls it
//! for an expiry timer; it never touches a socket itself. Grounded on
//! `QuicFuscate`'s `core::QuicFuscateConnection` (`src/core.rs`), trimmed
//! down to the client-only, non-FEC, non-XDP path this engine needs —
//! congestion control, MTU probing, and path-migration telemetry stay
//! whatever quiche's defaults are, since the spec's fingerprint contract
//! (§3/§8) is about the ClientHello and transport parameters, not
//! congestion behavior.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::error::{HolyError, TlsError};
use crate::fingerprint::FingerprintProfile;

pub struct QuicConnection {
    conn: quiche::Connection,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    last_timer_check: Instant,
}

fn build_config(profile: &FingerprintProfile, server_name: &str) -> Result<quiche::Config, HolyError> {
    let mut config = quiche::Config::new(quiche::PROTOCOL_VERSION).map_err(|e| {
        HolyError::Tls(TlsError::HandshakeFailed {
            host: server_name.to_string(),
            reason: format!("quiche config: {e}"),
        })
    })?;

    config
        .set_application_protos(&[b"h3"])
        .map_err(|e| HolyError::Tls(TlsError::ProtocolError(e.to_string())))?;

    let p = &profile.quic_transport_params;
    config.set_max_idle_timeout(p.idle_timeout_ms);
    config.set_max_recv_udp_payload_size(p.max_udp_payload_size as usize);
    config.set_max_send_udp_payload_size(p.max_udp_payload_size as usize);
    config.set_initial_max_data(p.initial_max_data);
    config.set_initial_max_stream_data_bidi_local(p.initial_max_stream_data);
    config.set_initial_max_stream_data_bidi_remote(p.initial_max_stream_data);
    config.set_initial_max_stream_data_uni(p.initial_max_stream_data);
    config.set_initial_max_streams_bidi(p.initial_max_streams_bidi);
    config.set_initial_max_streams_uni(p.initial_max_streams_uni);
    config.set_ack_delay_exponent(p.ack_delay_exponent);
    config.set_max_ack_delay(p.max_ack_delay_ms);
    config.verify_peer(true);

    Ok(config)
}

impl QuicConnection {
    pub fn connect(
        server_name: &str,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        profile: &FingerprintProfile,
    ) -> Result<Self, HolyError> {
        let mut config = build_config(profile, server_name)?;
        let scid = quiche::ConnectionId::from_ref(&[0; quiche::MAX_CONN_ID_LEN]);

        let conn = quiche::connect(Some(server_name), &scid, local_addr, peer_addr, &mut config).map_err(|e| {
            HolyError::Tls(TlsError::HandshakeFailed {
                host: server_name.to_string(),
                reason: format!("quiche connect: {e}"),
            })
        })?;

        Ok(Self { conn, local_addr, peer_addr, last_timer_check: Instant::now() })
    }

    /// Feeds one received UDP datagram into the connection.
    pub fn on_datagram(&mut self, data: &mut [u8]) -> Result<(), HolyError> {
        let info = quiche::RecvInfo { to: self.local_addr, from: self.peer_addr };
        self.conn
            .recv(data, info)
            .map(|_| ())
            .or_else(|e| if e == quiche::Error::Done { Ok(()) } else { Err(e) })
            .map_err(|e| HolyError::Tls(TlsError::ProtocolError(e.to_string())))
    }

    /// Fills `out` with the next UDP datagram to send, if any is pending.
    pub fn send(&mut self, out: &mut [u8]) -> Result<Option<usize>, HolyError> {
        match self.conn.send(out) {
            Ok((len, _info)) => Ok(Some(len)),
            Err(quiche::Error::Done) => Ok(None),
            Err(e) => Err(HolyError::Tls(TlsError::ProtocolError(e.to_string()))),
        }
    }

    /// How long until quiche's internal timer next needs servicing; the
    /// reactor arms a one-shot timer for this and calls `on_timeout`.
    pub fn timeout(&self) -> Option<Duration> {
        self.conn.timeout()
    }

    pub fn on_timeout(&mut self) {
        self.conn.on_timeout();
        self.last_timer_check = Instant::now();
    }

    pub fn is_established(&self) -> bool {
        self.conn.is_established()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    pub fn inner_mut(&mut self) -> &mut quiche::Connection {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_produces_an_established_false_connection() {
        let profile = FingerprintProfile::chrome_143(false);
        let local: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let peer: SocketAddr = "127.0.0.1:443".parse().unwrap();
        let conn = QuicConnection::connect("example.com", local, peer, &profile);
        let conn = conn.expect("quiche connect should succeed before any I/O");
        assert!(!conn.is_established());
        assert!(!conn.is_closed());
    }
}
