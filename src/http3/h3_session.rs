//! HTTP/3 layer over a `QuicConnection`, via `quiche::h3::Connection`
//! (spec §4.I). QPACK encoding/decoding is entirely quiche's own — this
//! module only maps `fingerprint::HeaderField`s to `quiche::h3::Header`s
//! and quiche's `Event`s to `StreamResponse`s, the same shape
//! `http2::Http2Session` exposes so the parent `Connection` can treat both
//! protocols uniformly. Grounded on `QuicFuscate`'s `init_http3`/request
//! loop (`src/core.rs`).

use std::collections::HashMap;

use crate::error::{Http2Error, HolyError};
use crate::fingerprint::HeaderField;
use crate::http2::StreamResponse;

use super::quic_connection::QuicConnection;

pub struct H3Session {
    conn: quiche::h3::Connection,
    responses: HashMap<u64, StreamResponse>,
}

impl H3Session {
    pub fn new(quic: &mut QuicConnection) -> Result<Self, HolyError> {
        let h3_config = quiche::h3::Config::new()
            .map_err(|e| HolyError::Http2(Http2Error::ProtocolError { stream_id: 0, reason: e.to_string() }))?;
        let conn = quiche::h3::Connection::with_transport(quic.inner_mut(), &h3_config)
            .map_err(|e| HolyError::Http2(Http2Error::ProtocolError { stream_id: 0, reason: e.to_string() }))?;
        Ok(Self { conn, responses: HashMap::new() })
    }

    pub fn submit_request(
        &mut self,
        quic: &mut QuicConnection,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<u64, HolyError> {
        let h3_headers: Vec<quiche::h3::Header> = headers
            .iter()
            .map(|h| quiche::h3::Header::new(h.name.as_bytes(), h.value.as_bytes()))
            .collect();

        let stream_id = self
            .conn
            .send_request(quic.inner_mut(), &h3_headers, end_stream)
            .map_err(|e| HolyError::Http2(Http2Error::StreamError { stream_id: 0, reason: e.to_string() }))?;

        self.responses.insert(stream_id, StreamResponse::default());
        Ok(stream_id)
    }

    /// Drains every pending HTTP/3 event on this connection, updating the
    /// per-stream response state. Call this after `QuicConnection::on_datagram`.
    pub fn poll_events(&mut self, quic: &mut QuicConnection) -> Result<Vec<u64>, HolyError> {
        let mut updated = Vec::new();
        loop {
            match self.conn.poll(quic.inner_mut()) {
                Ok((stream_id, quiche::h3::Event::Headers { list, .. })) => {
                    let response = self.responses.entry(stream_id).or_default();
                    for header in list {
                        let name = String::from_utf8_lossy(header.name()).into_owned();
                        let value = String::from_utf8_lossy(header.value()).into_owned();
                        if name == ":status" {
                            response.status = value.parse().unwrap_or(0);
                        } else {
                            response.headers.push((name, value));
                        }
                    }
                    updated.push(stream_id);
                }
                Ok((stream_id, quiche::h3::Event::Data)) => {
                    let mut buf = [0u8; 16 * 1024];
                    while let Ok(n) = self.conn.recv_body(quic.inner_mut(), stream_id, &mut buf) {
                        if n == 0 {
                            break;
                        }
                        self.responses.entry(stream_id).or_default().body.extend_from_slice(&buf[..n]);
                    }
                    updated.push(stream_id);
                }
                Ok((stream_id, quiche::h3::Event::Finished)) => {
                    if let Some(response) = self.responses.get_mut(&stream_id) {
                        response.ended = true;
                    }
                    updated.push(stream_id);
                }
                Ok((_, quiche::h3::Event::Reset(_))) => {}
                Ok((_, quiche::h3::Event::PriorityUpdate)) => {}
                Ok((_, quiche::h3::Event::GoAway)) => break,
                Err(quiche::h3::Error::Done) => break,
                Err(e) => {
                    return Err(HolyError::Http2(Http2Error::ProtocolError { stream_id: 0, reason: e.to_string() }));
                }
            }
        }
        Ok(updated)
    }

    pub fn take_response_if_complete(&mut self, stream_id: u64) -> Option<StreamResponse> {
        let response = self.responses.get(&stream_id)?;
        if response.ended {
            self.responses.remove(&stream_id)
        } else {
            None
        }
    }
}
