//! HTTP/2 connection and stream multiplexer (spec §4.H).
//!
//! Drives an `hpack::Encoder`/`Decoder` pair (the "external HPACK codec"
//! the engine's TLS-adjacent boundary assumes, spec §1) over frames built
//! by `http2::frame`. Connection preface, SETTINGS, and the first-stream
//! WINDOW_UPDATE/PRIORITY sequence reproduce Chrome's exact opening moves
//! (spec §8 invariant 2); stream bookkeeping and flow control are grounded
//! on `primp-h2`'s stream-state shape, generalized down to what a
//! request/response client (not a server) needs.

use std::collections::HashMap;

use hpack::{Decoder as HpackDecoder, Encoder as HpackEncoder};

use crate::error::{Http2Error, HolyError};
use crate::fingerprint::{FingerprintProfile, HeaderField};

use super::frame::{self, encode_settings_ack, encode_window_update, FrameType, FRAME_HEADER_LEN};

pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

#[derive(Debug, Clone, Default)]
pub struct StreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub ended: bool,
}

struct Stream {
    state: StreamState,
    send_window: i64,
    recv_window: i64,
    response: StreamResponse,
}

/// A single HTTP/2 connection's frame-level bookkeeping. Socket I/O stays
/// with the parent `Connection`; this type only turns bytes into frames
/// and frames into stream events, and vice versa.
pub struct Http2Session {
    encoder: HpackEncoder<'static>,
    decoder: HpackDecoder<'static>,
    streams: HashMap<u32, Stream>,
    next_stream_id: u32,
    connection_send_window: i64,
    connection_recv_window: i64,
    goaway_received: Option<(u32, u32)>,
    read_buf: Vec<u8>,
    preface_sent: bool,
}

impl Http2Session {
    pub fn new(profile: &FingerprintProfile) -> Self {
        Self {
            encoder: HpackEncoder::new(),
            decoder: HpackDecoder::new(),
            streams: HashMap::new(),
            next_stream_id: 1,
            connection_send_window: 65_535,
            connection_recv_window: profile.settings.connection_window_update_increment as i64 + 65_535,
            goaway_received: None,
            read_buf: Vec::new(),
            preface_sent: false,
        }
    }

    /// Connection preface + SETTINGS + WINDOW_UPDATE, Chrome's exact
    /// opening sequence (spec §8 invariant 2). Chrome never sends a
    /// PRIORITY frame, on the first stream or any other.
    pub fn opening_bytes(&mut self, profile: &FingerprintProfile) -> Vec<u8> {
        self.preface_sent = true;
        let mut out = Vec::new();
        out.extend_from_slice(CONNECTION_PREFACE);
        out.extend_from_slice(&frame::settings_order_from_profile(profile).encode());
        out.extend_from_slice(&encode_window_update(0, profile.settings.connection_window_update_increment));
        out
    }

    /// Opens a new client-initiated stream and returns its ID plus the
    /// outgoing bytes: a HEADERS frame, followed by one DATA frame
    /// carrying `body` when it's non-empty. No PRIORITY frame is ever
    /// sent — Chrome sends none (spec §4.A, §4.H).
    pub fn submit_request(&mut self, headers: &[HeaderField], body: &[u8]) -> (u32, Vec<u8>) {
        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;
        let end_stream = body.is_empty();

        self.streams.insert(
            stream_id,
            Stream {
                state: if end_stream { StreamState::HalfClosedLocal } else { StreamState::Open },
                send_window: 6_291_456,
                recv_window: 6_291_456,
                response: StreamResponse::default(),
            },
        );

        let header_pairs: Vec<(&[u8], &[u8])> =
            headers.iter().map(|h| (h.name.as_bytes(), h.value.as_bytes())).collect();
        let block = self.encoder.encode(header_pairs);

        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + block.len() + FRAME_HEADER_LEN + body.len());
        let flags = if end_stream { 0x5 } else { 0x4 }; // END_HEADERS (+ END_STREAM)
        write_headers_frame(&mut out, stream_id, flags, &block);

        if !end_stream {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.state = StreamState::HalfClosedLocal;
                stream.send_window -= body.len() as i64;
            }
            write_data_frame(&mut out, stream_id, 0x1, body); // END_STREAM
        }

        (stream_id, out)
    }

    /// Feeds raw bytes read from the socket, returning any outgoing frames
    /// this step produces (SETTINGS ACK, WINDOW_UPDATE replenishment) and
    /// the set of streams whose responses changed.
    pub fn on_readable(&mut self, data: &[u8]) -> Result<(Vec<u8>, Vec<u32>), HolyError> {
        self.read_buf.extend_from_slice(data);
        let mut outgoing = Vec::new();
        let mut updated_streams = Vec::new();

        while let Some((header, payload_len)) = peek_frame_header(&self.read_buf) {
            if self.read_buf.len() < FRAME_HEADER_LEN + payload_len {
                break;
            }
            let payload = self.read_buf[FRAME_HEADER_LEN..FRAME_HEADER_LEN + payload_len].to_vec();
            self.read_buf.drain(..FRAME_HEADER_LEN + payload_len);

            self.handle_frame(header, &payload, &mut outgoing, &mut updated_streams)?;
        }

        Ok((outgoing, updated_streams))
    }

    fn handle_frame(
        &mut self,
        header: FrameHeader,
        payload: &[u8],
        outgoing: &mut Vec<u8>,
        updated_streams: &mut Vec<u32>,
    ) -> Result<(), HolyError> {
        match header.frame_type {
            t if t == FrameType::Settings as u8 => {
                if header.flags & 0x1 == 0 {
                    outgoing.extend_from_slice(&encode_settings_ack());
                }
            }
            t if t == FrameType::WindowUpdate as u8 => {
                if payload.len() == 4 {
                    let increment = u32::from_be_bytes([payload[0] & 0x7f, payload[1], payload[2], payload[3]]);
                    if header.stream_id == 0 {
                        self.connection_send_window += increment as i64;
                    } else if let Some(stream) = self.streams.get_mut(&header.stream_id) {
                        stream.send_window += increment as i64;
                    }
                }
            }
            t if t == FrameType::Headers as u8 => {
                let decoded = self
                    .decoder
                    .decode(payload)
                    .map_err(|_| HolyError::Http2(Http2Error::ProtocolError {
                        stream_id: header.stream_id,
                        reason: "HPACK decode failure".to_string(),
                    }))?;
                if let Some(stream) = self.streams.get_mut(&header.stream_id) {
                    for (name, value) in decoded {
                        let name = String::from_utf8_lossy(&name).into_owned();
                        let value = String::from_utf8_lossy(&value).into_owned();
                        if name == ":status" {
                            stream.response.status = value.parse().unwrap_or(0);
                        } else {
                            stream.response.headers.push((name, value));
                        }
                    }
                    if header.flags & 0x1 != 0 {
                        stream.response.ended = true;
                        stream.state = StreamState::HalfClosedRemote;
                    }
                    updated_streams.push(header.stream_id);
                }
            }
            t if t == FrameType::Data as u8 => {
                if let Some(stream) = self.streams.get_mut(&header.stream_id) {
                    stream.response.body.extend_from_slice(payload);
                    stream.recv_window -= payload.len() as i64;
                    if header.flags & 0x1 != 0 {
                        stream.response.ended = true;
                        stream.state = StreamState::Closed;
                    }
                    updated_streams.push(header.stream_id);

                    if stream.recv_window < 3_000_000 {
                        let top_up = 6_291_456 - stream.recv_window;
                        stream.recv_window += top_up;
                        outgoing.extend_from_slice(&encode_window_update(header.stream_id, top_up as u32));
                    }
                }
            }
            t if t == FrameType::GoAway as u8 => {
                if payload.len() >= 8 {
                    let last_stream = u32::from_be_bytes([payload[0] & 0x7f, payload[1], payload[2], payload[3]]);
                    let error_code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
                    self.goaway_received = Some((last_stream, error_code));
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn take_response_if_complete(&mut self, stream_id: u32) -> Option<StreamResponse> {
        let stream = self.streams.get(&stream_id)?;
        if stream.response.ended {
            self.streams.remove(&stream_id).map(|s| s.response)
        } else {
            None
        }
    }

    pub fn goaway_received(&self) -> Option<(u32, u32)> {
        self.goaway_received
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

struct FrameHeader {
    frame_type: u8,
    flags: u8,
    stream_id: u32,
}

fn peek_frame_header(buf: &[u8]) -> Option<(FrameHeader, usize)> {
    if buf.len() < FRAME_HEADER_LEN {
        return None;
    }
    let length = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]) as usize;
    let header = FrameHeader {
        frame_type: buf[3],
        flags: buf[4],
        stream_id: u32::from_be_bytes([buf[5] & 0x7f, buf[6], buf[7], buf[8]]),
    };
    Some((header, length))
}

fn write_headers_frame(out: &mut Vec<u8>, stream_id: u32, flags: u8, block: &[u8]) {
    out.extend_from_slice(&(block.len() as u32).to_be_bytes()[1..4]);
    out.push(FrameType::Headers as u8);
    out.push(flags);
    out.extend_from_slice(&(stream_id & 0x7fff_ffff).to_be_bytes());
    out.extend_from_slice(block);
}

fn write_data_frame(out: &mut Vec<u8>, stream_id: u32, flags: u8, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..4]);
    out.push(FrameType::Data as u8);
    out.push(flags);
    out.extend_from_slice(&(stream_id & 0x7fff_ffff).to_be_bytes());
    out.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{FingerprintProfile, RequestContext, HighEntropyHints, build_h2_headers, SecChUaGenerator};

    #[test]
    fn opening_bytes_start_with_connection_preface() {
        let profile = FingerprintProfile::chrome_143(false);
        let mut session = Http2Session::new(&profile);
        let bytes = session.opening_bytes(&profile);
        assert!(bytes.starts_with(CONNECTION_PREFACE));
    }

    #[test]
    fn submit_request_never_emits_a_priority_frame() {
        let profile = FingerprintProfile::chrome_143(false);
        let mut session = Http2Session::new(&profile);
        let ctx = RequestContext {
            method: "GET",
            authority: "example.com",
            scheme: "https",
            path: "/",
            platform: "Windows",
            user_agent: "UA",
            accept: "*/*",
            accept_encoding: "gzip",
            accept_language: "en",
            is_navigation: false,
            is_activated: false,
            sec_fetch_site: "none",
            sec_fetch_mode: "navigate",
            sec_fetch_dest: "document",
            high_entropy_hints: HighEntropyHints::default(),
            custom_headers: &[],
        };
        let gen = SecChUaGenerator::new(143);
        let headers = build_h2_headers(&ctx, &gen);
        let (stream_id, bytes) = session.submit_request(&headers, &[]);
        assert_eq!(stream_id, 1);
        // Exactly one frame: its declared length accounts for the whole buffer,
        // so there is no trailing PRIORITY frame appended after it.
        assert_eq!(bytes[3], FrameType::Headers as u8);
        let declared_len = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]) as usize;
        assert_eq!(FRAME_HEADER_LEN + declared_len, bytes.len());
    }

    #[test]
    fn second_stream_gets_its_own_id_and_no_priority_either() {
        let profile = FingerprintProfile::chrome_143(false);
        let mut session = Http2Session::new(&profile);
        let headers = vec![HeaderField { name: ":method".to_string(), value: "GET".to_string() }];
        let (first_id, first) = session.submit_request(&headers, &[]);
        let (second_id, second) = session.submit_request(&headers, &[]);
        assert_eq!(first_id, 1);
        assert_eq!(second_id, 3);
        assert_eq!(first[3], FrameType::Headers as u8);
        assert_eq!(second[3], FrameType::Headers as u8);
        assert_eq!(session.stream_count(), 2);
    }

    #[test]
    fn request_with_a_body_gets_a_trailing_data_frame_with_end_stream() {
        let profile = FingerprintProfile::chrome_143(false);
        let mut session = Http2Session::new(&profile);
        let headers = vec![HeaderField { name: ":method".to_string(), value: "POST".to_string() }];
        let body = b"field=value".to_vec();
        let (stream_id, bytes) = session.submit_request(&headers, &body);

        // HEADERS frame without END_STREAM (flags = END_HEADERS only).
        let headers_len = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]) as usize;
        assert_eq!(bytes[4], 0x4);

        // DATA frame follows, carrying the body and setting END_STREAM.
        let data_header_start = FRAME_HEADER_LEN + headers_len;
        let data_len = u32::from_be_bytes([
            0,
            bytes[data_header_start],
            bytes[data_header_start + 1],
            bytes[data_header_start + 2],
        ]) as usize;
        assert_eq!(bytes[data_header_start + 3], FrameType::Data as u8);
        assert_eq!(bytes[data_header_start + 4], 0x1); // END_STREAM
        assert_eq!(data_len, body.len());
        let data_payload_start = data_header_start + FRAME_HEADER_LEN;
        assert_eq!(&bytes[data_payload_start..data_payload_start + data_len], body.as_slice());
        assert_eq!(stream_id, 1);
    }

    #[test]
    fn settings_frame_without_ack_flag_produces_an_ack() {
        let profile = FingerprintProfile::chrome_143(false);
        let mut session = Http2Session::new(&profile);
        let mut settings_frame = vec![0, 0, 0, FrameType::Settings as u8, 0, 0, 0, 0, 0];
        settings_frame.truncate(9);
        let (outgoing, _) = session.on_readable(&settings_frame).unwrap();
        assert!(!outgoing.is_empty());
        assert_eq!(outgoing[4], 0x1); // ACK flag set
    }

    #[test]
    fn goaway_is_recorded() {
        let profile = FingerprintProfile::chrome_143(false);
        let mut session = Http2Session::new(&profile);
        let mut frame = vec![0, 0, 8, FrameType::GoAway as u8, 0, 0, 0, 0, 0];
        frame.extend_from_slice(&5u32.to_be_bytes());
        frame.extend_from_slice(&0u32.to_be_bytes());
        session.on_readable(&frame).unwrap();
        assert_eq!(session.goaway_received(), Some((5, 0)));
    }
}
