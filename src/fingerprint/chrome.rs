//! Chrome 143 fingerprint constants.
//!
//! Cipher suite, named-group, and signature-algorithm orderings are
//! grounded on `primp-rustls`'s `crypto::emulation` tables (the teacher's
//! own Chrome emulation data); the extension order, SETTINGS values, and
//! WINDOW_UPDATE increment reproduce spec §3/§8 exactly, since those are
//! this crate's byte-exact contract.

use rustls::{CipherSuite, NamedGroup, SignatureScheme};

/// Chrome 143's TLS 1.2+1.3 cipher suite order (GREASE first).
pub const CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
];

/// Chrome 143's supported-groups order: X25519MLKEM768, X25519, P-256, P-384
/// (spec §8 invariant 1 / §3 data model), GREASE injected by the TLS engine.
pub const NAMED_GROUPS: &[NamedGroup] = &[
    NamedGroup::X25519MLKEM768,
    NamedGroup::X25519,
    NamedGroup::secp256r1,
    NamedGroup::secp384r1,
];

pub const SIGNATURE_ALGORITHMS: &[SignatureScheme] = &[
    SignatureScheme::ECDSA_NISTP256_SHA256,
    SignatureScheme::RSA_PSS_SHA256,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::ECDSA_NISTP384_SHA384,
    SignatureScheme::RSA_PSS_SHA384,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::RSA_PSS_SHA512,
    SignatureScheme::RSA_PKCS1_SHA512,
];

/// Chrome 143's ClientHello extension order, as TLS extension-type IDs.
/// Reproduced byte-for-byte from spec §3 and §8 invariant 1.
pub const EXTENSION_ORDER: &[u16] = &[
    11, 23, 45, 18, 35, 65037, 5, 0, 27, 16, 13, 10, 65281, 17613, 43, 51,
];

/// `extension-order string`, dash-separated, as spec §3 defines the profile field.
pub fn extension_order_string() -> String {
    EXTENSION_ORDER
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// ALPS new codepoint (spec §3/§6), with `h2` as the application setting.
pub const ALPS_CODEPOINT: u16 = 17613;
pub const ALPS_APPLICATION_SETTING: &str = "h2";

/// Certificate compression algorithm ID (Brotli, RFC 8879).
pub const CERT_COMPRESSION_BROTLI: u16 = 2;

pub const ALPN_PROTOCOLS_H2_H1: &[&str] = &["h2", "http/1.1"];
pub const ALPN_PROTOCOLS_H1_ONLY: &[&str] = &["http/1.1"];

pub const RECORD_SIZE_LIMIT: u16 = 16385;
pub const KEY_SHARES_COUNT: usize = 2;

/// Default request headers Chrome sends for a top-level navigation, absent
/// any page-supplied overrides (spec §4.A).
pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br, zstd";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// HTTP/2 SETTINGS values Chrome 143 actually sends (spec §3/§8 invariant 2):
/// only these four, in this order; MAX_CONCURRENT_STREAMS and MAX_FRAME_SIZE
/// are omitted entirely (not sent with a default value — absent).
pub const SETTINGS_HEADER_TABLE_SIZE: u32 = 65536;
pub const SETTINGS_ENABLE_PUSH: u32 = 0;
pub const SETTINGS_INITIAL_WINDOW_SIZE: u32 = 6_291_456;
pub const SETTINGS_MAX_HEADER_LIST_SIZE: u32 = 262_144;

/// Connection-level WINDOW_UPDATE increment sent to stream 0 right after
/// the SETTINGS frame (spec §3/§4.A/§8 invariant 2).
pub const CONNECTION_WINDOW_UPDATE_INCREMENT: u32 = 15_663_105;

/// Chrome-tuned per-stream / connection flow control (spec §4.H).
pub const H2_INITIAL_STREAM_WINDOW: u32 = 6_291_456;
pub const H2_INITIAL_CONNECTION_WINDOW: u32 = 15 * 1024 * 1024;

/// QUIC transport parameters for the Chrome-QUIC profile (spec §4.I).
#[derive(Debug, Clone, Copy)]
pub struct QuicTransportParams {
    pub idle_timeout_ms: u64,
    pub max_udp_payload_size: u64,
    pub initial_max_data: u64,
    pub initial_max_stream_data: u64,
    pub initial_max_streams_bidi: u64,
    pub initial_max_streams_uni: u64,
    pub ack_delay_exponent: u64,
    pub max_ack_delay_ms: u64,
}

pub const QUIC_TRANSPORT_PARAMS: QuicTransportParams = QuicTransportParams {
    idle_timeout_ms: 30_000,
    max_udp_payload_size: 1350,
    initial_max_data: 15 * 1024 * 1024,
    initial_max_stream_data: 6 * 1024 * 1024,
    initial_max_streams_bidi: 100,
    initial_max_streams_uni: 100,
    ack_delay_exponent: 3,
    max_ack_delay_ms: 25,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_order_matches_spec_invariant() {
        assert_eq!(
            EXTENSION_ORDER,
            &[11, 23, 45, 18, 35, 65037, 5, 0, 27, 16, 13, 10, 65281, 17613, 43, 51]
        );
        assert_eq!(
            extension_order_string(),
            "11-23-45-18-35-65037-5-0-27-16-13-10-65281-17613-43-51"
        );
    }

    #[test]
    fn settings_values_match_spec() {
        assert_eq!(SETTINGS_HEADER_TABLE_SIZE, 65536);
        assert_eq!(SETTINGS_ENABLE_PUSH, 0);
        assert_eq!(SETTINGS_INITIAL_WINDOW_SIZE, 6_291_456);
        assert_eq!(SETTINGS_MAX_HEADER_LIST_SIZE, 262_144);
        assert_eq!(CONNECTION_WINDOW_UPDATE_INCREMENT, 15_663_105);
    }
}
