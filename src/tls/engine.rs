//! `TlsEngine`: the boundary between this crate and whatever TLS stack
//! actually produces the byte-exact ClientHello (spec §1/§4.A).
//!
//! The spec assumes a BoringSSL-class API that exposes direct control over
//! cipher/extension/group ordering, GREASE placement, and certificate
//! compression. Mainline `rustls` exposes a subset of that through a custom
//! `CryptoProvider` (ordered `cipher_suites`/`kx_groups`); it does not
//! expose GREASE injection, extension reordering, or ALPS as stable public
//! API. This trait is the seam: `RustlsEngine` implements what rustls
//! genuinely supports today, and a future engine backed by a forked/patched
//! TLS stack can implement the rest without touching any caller of
//! `TlsEngine`. Grounded on `primp-rustls`'s `BrowserEmulator`
//! (`client/client_emulator.rs`), which plays the same role for the
//! teacher's reqwest fork.

use std::io;

use crate::error::HolyError;
use crate::fingerprint::FingerprintProfile;

/// Result of feeding ciphertext/plaintext through a `TlsConnection`'s
/// underlying engine for one reactor-driven step.
pub enum EngineStep {
    /// Progress was made; caller should check `wants_read`/`wants_write`.
    Progress,
    /// The engine has no more work to do until more I/O is available.
    WouldBlock,
    /// The peer closed the TLS session cleanly.
    Eof,
}

/// Abstracts the TLS handshake/record engine so the rest of the crate
/// (connection state machine, session cache, pool) never depends on a
/// concrete TLS library.
pub trait TlsEngine: Send {
    /// Feeds ciphertext read from the socket into the engine.
    fn feed_ciphertext(&mut self, data: &[u8]) -> Result<EngineStep, HolyError>;

    /// Drains ciphertext the engine wants written to the socket.
    fn take_outgoing_ciphertext(&mut self, out: &mut Vec<u8>) -> usize;

    /// Submits application data to be encrypted and queued for output.
    fn write_plaintext(&mut self, data: &[u8]) -> Result<usize, HolyError>;

    /// Drains decrypted application data produced by the last
    /// `feed_ciphertext` call.
    fn take_plaintext(&mut self, out: &mut Vec<u8>) -> usize;

    fn is_handshaking(&self) -> bool;
    fn wants_read(&self) -> bool;
    fn wants_write(&self) -> bool;

    /// The negotiated ALPN protocol, once the handshake completes.
    fn negotiated_alpn(&self) -> Option<&[u8]>;

    /// Whether the handshake resumed a cached session (0-RTT or otherwise).
    fn session_was_resumed(&self) -> bool;
}

/// Constructs the concrete engine to use for a new connection. Kept as a
/// free function (rather than a trait method on `FingerprintProfile`) so
/// swapping engines later doesn't touch the fingerprint module.
pub fn build_engine(
    profile: &FingerprintProfile,
    server_name: &str,
    resumption: Option<super::session_cache::SessionTicket>,
) -> Result<Box<dyn TlsEngine>, HolyError> {
    let engine = super::rustls_engine::RustlsEngine::new(profile, server_name, resumption)
        .map_err(|e| HolyError::Tls(crate::error::TlsError::HandshakeFailed {
            host: server_name.to_string(),
            reason: format!("engine construction failed: {e}"),
        }))?;
    Ok(Box::new(engine))
}

pub(crate) fn io_would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}
