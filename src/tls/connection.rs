//! `TlsConnection`: the handshake/record submachine driven by a parent
//! `Connection`'s reactor callbacks (spec §4.A/§4.F).
//!
//! Each reactor tick gives this submachine at most one read (capped at
//! 16 KiB) and bounds its internal handshake-record loop at 4 iterations,
//! so one connection can never starve the shard it lives on — grounded on
//! the original `holytls` `src/holytls/tls/tls_connection.cc`'s per-tick
//! budget.

use crate::error::HolyError;
use crate::fingerprint::FingerprintProfile;

use super::engine::{build_engine, EngineStep, TlsEngine};
use super::session_cache::{SessionCache, SessionTicket};

const MAX_READ_PER_TICK: usize = 16 * 1024;
const MAX_HANDSHAKE_ITERATIONS_PER_TICK: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Handshaking,
    Connected,
    ShuttingDown,
    Closed,
    Error,
}

/// What the caller (the parent `Connection`) should do after a step.
pub enum StepOutcome {
    Continue,
    NeedMoreData,
    HandshakeComplete,
    Closed,
    Error(HolyError),
}

pub struct TlsConnection {
    state: State,
    engine: Box<dyn TlsEngine>,
    origin: String,
    outgoing: Vec<u8>,
    incoming_plaintext: Vec<u8>,
}

impl TlsConnection {
    pub fn new(
        profile: &FingerprintProfile,
        server_name: &str,
        port: u16,
        session_cache: &SessionCache,
    ) -> Result<Self, HolyError> {
        let origin = format!("{server_name}:{port}");
        let resumption = session_cache.lookup(&origin);
        let engine = build_engine(profile, server_name, resumption)?;
        Ok(Self {
            state: State::Handshaking,
            engine,
            origin,
            outgoing: Vec::new(),
            incoming_plaintext: Vec::new(),
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Feeds at most `MAX_READ_PER_TICK` bytes of raw ciphertext read from
    /// the socket this tick, bounding internal progress to
    /// `MAX_HANDSHAKE_ITERATIONS_PER_TICK` record-processing iterations.
    pub fn on_readable(&mut self, raw: &[u8]) -> StepOutcome {
        if self.state == State::Closed || self.state == State::Error {
            return StepOutcome::Closed;
        }
        let capped = &raw[..raw.len().min(MAX_READ_PER_TICK)];

        let mut iterations = 0;
        let mut offset = 0;
        while offset < capped.len() && iterations < MAX_HANDSHAKE_ITERATIONS_PER_TICK {
            match self.engine.feed_ciphertext(&capped[offset..]) {
                Ok(EngineStep::Progress) => {}
                Ok(EngineStep::WouldBlock) => break,
                Ok(EngineStep::Eof) => {
                    self.state = State::Closed;
                    return StepOutcome::Closed;
                }
                Err(e) => {
                    self.state = State::Error;
                    return StepOutcome::Error(e);
                }
            }
            offset = capped.len();
            iterations += 1;
        }

        self.engine.take_plaintext(&mut self.incoming_plaintext);

        if self.state == State::Handshaking && !self.engine.is_handshaking() {
            self.state = State::Connected;
            return StepOutcome::HandshakeComplete;
        }
        StepOutcome::Continue
    }

    /// Drains ciphertext pending for the socket, one record's worth per
    /// call, into the caller-owned write buffer.
    pub fn on_writable(&mut self, out: &mut Vec<u8>) -> StepOutcome {
        self.engine.take_outgoing_ciphertext(out);
        if !self.engine.wants_write() && self.state == State::ShuttingDown {
            self.state = State::Closed;
            return StepOutcome::Closed;
        }
        StepOutcome::Continue
    }

    pub fn submit_plaintext(&mut self, data: &[u8]) -> Result<usize, HolyError> {
        let n = self.engine.write_plaintext(data)?;
        self.engine.take_outgoing_ciphertext(&mut self.outgoing);
        Ok(n)
    }

    pub fn take_outgoing(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn take_incoming_plaintext(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.incoming_plaintext)
    }

    pub fn wants_read(&self) -> bool {
        self.engine.wants_read()
    }

    pub fn wants_write(&self) -> bool {
        self.engine.wants_write()
    }

    pub fn negotiated_alpn(&self) -> Option<Vec<u8>> {
        self.engine.negotiated_alpn().map(|p| p.to_vec())
    }

    pub fn session_was_resumed(&self) -> bool {
        self.engine.session_was_resumed()
    }

    pub fn begin_shutdown(&mut self) {
        self.state = State::ShuttingDown;
    }

    pub fn store_session(&self, cache: &SessionCache, ticket: SessionTicket) {
        cache.store(&self.origin, ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A fake engine for exercising `TlsConnection`'s state machine without
    /// a real handshake: completes after the first `feed_ciphertext` call.
    struct MockEngine {
        handshaking: bool,
        plaintext_out: Vec<u8>,
    }

    impl TlsEngine for MockEngine {
        fn feed_ciphertext(&mut self, data: &[u8]) -> Result<EngineStep, HolyError> {
            if data.is_empty() {
                return Ok(EngineStep::WouldBlock);
            }
            self.handshaking = false;
            self.plaintext_out.extend_from_slice(b"decrypted");
            Ok(EngineStep::Progress)
        }
        fn take_outgoing_ciphertext(&mut self, out: &mut Vec<u8>) -> usize {
            out.extend_from_slice(b"ciphertext");
            10
        }
        fn write_plaintext(&mut self, data: &[u8]) -> Result<usize, HolyError> {
            Ok(data.len())
        }
        fn take_plaintext(&mut self, out: &mut Vec<u8>) -> usize {
            let n = self.plaintext_out.len();
            out.append(&mut self.plaintext_out);
            n
        }
        fn is_handshaking(&self) -> bool {
            self.handshaking
        }
        fn wants_read(&self) -> bool {
            true
        }
        fn wants_write(&self) -> bool {
            false
        }
        fn negotiated_alpn(&self) -> Option<&[u8]> {
            Some(b"h2")
        }
        fn session_was_resumed(&self) -> bool {
            false
        }
    }

    fn mock_connection() -> TlsConnection {
        TlsConnection {
            state: State::Handshaking,
            engine: Box::new(MockEngine { handshaking: true, plaintext_out: Vec::new() }),
            origin: "example.com:443".to_string(),
            outgoing: Vec::new(),
            incoming_plaintext: Vec::new(),
        }
    }

    #[test]
    fn handshake_completes_on_first_progress() {
        let mut conn = mock_connection();
        let outcome = conn.on_readable(b"server hello bytes");
        assert!(matches!(outcome, StepOutcome::HandshakeComplete));
        assert_eq!(conn.state(), State::Connected);
    }

    #[test]
    fn plaintext_is_buffered_and_drained() {
        let mut conn = mock_connection();
        conn.on_readable(b"server hello bytes");
        let plaintext = conn.take_incoming_plaintext();
        assert_eq!(plaintext, b"decrypted");
        assert!(conn.take_incoming_plaintext().is_empty());
    }

    #[test]
    fn read_is_capped_per_tick() {
        let mut conn = mock_connection();
        let big = vec![0u8; MAX_READ_PER_TICK * 3];
        conn.on_readable(&big);
        assert_eq!(conn.state(), State::Connected);
    }

    #[test]
    fn closed_connection_rejects_further_reads() {
        let mut conn = mock_connection();
        conn.state = State::Closed;
        assert!(matches!(conn.on_readable(b"data"), StepOutcome::Closed));
    }
}
