//! `FingerprintProfile`: the immutable, per-Chrome-version bundle of every
//! wire-visible choice the engine makes (spec §3).
//!
//! One profile is built per `ReactorManager` (or per `Connection` in tests)
//! and then shared read-only across every connection that impersonates the
//! same Chrome version — grounded on `primp-rustls`'s `BrowserEmulator`
//! (`client/client_emulator.rs`), generalized from "one struct per browser
//! family" to "one struct per Chrome version" since this crate's scope is
//! Chrome-only (spec Non-goals).

use rustls::{CipherSuite, NamedGroup, SignatureScheme};

use super::chrome;
use super::sec_ch_ua::SecChUaGenerator;

/// HTTP/2 pseudo-header order. Chrome always emits MASP
/// (`:method, :authority, :scheme, :path`); the enum exists so alternate
/// orders can be added without changing callers (spec §4.A/§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHeaderOrder {
    Masp,
}

impl PseudoHeaderOrder {
    pub fn order(self) -> [&'static str; 4] {
        match self {
            PseudoHeaderOrder::Masp => [":method", ":authority", ":scheme", ":path"],
        }
    }
}

/// Feature flags that vary the fingerprint beyond fixed orderings
/// (spec §3 "feature flags").
#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    pub grease: bool,
    pub extension_permutation: bool,
    pub certificate_compression_brotli: bool,
    pub encrypted_client_hello: bool,
    pub alps_new_codepoint: bool,
}

/// HTTP/2 SETTINGS Chrome actually sends, plus which ones are present
/// (spec §3/§8 invariant 2: Chrome omits MAX_CONCURRENT_STREAMS and
/// MAX_FRAME_SIZE rather than sending their defaults).
#[derive(Debug, Clone, Copy)]
pub struct SettingsProfile {
    pub header_table_size: Option<u32>,
    pub enable_push: Option<u32>,
    pub initial_window_size: Option<u32>,
    pub max_header_list_size: Option<u32>,
    pub connection_window_update_increment: u32,
}

/// The complete, immutable fingerprint for one impersonated Chrome version.
#[derive(Clone)]
pub struct FingerprintProfile {
    pub chrome_major: u16,
    pub full_version: String,

    pub cipher_suites: Vec<CipherSuite>,
    pub named_groups: Vec<NamedGroup>,
    pub signature_algorithms: Vec<SignatureScheme>,
    pub extension_order: Vec<u16>,

    pub features: FeatureFlags,
    pub alpn_protocols: Vec<&'static str>,
    pub record_size_limit: u16,
    pub key_shares_count: usize,

    pub settings: SettingsProfile,
    pub pseudo_header_order: PseudoHeaderOrder,

    pub sec_ch_ua: SecChUaGenerator,
    pub quic_transport_params: chrome::QuicTransportParams,
}

impl FingerprintProfile {
    /// Builds the Chrome 143 profile — the only version this crate ships
    /// tables for today (spec §3 Open Question: additional versions are
    /// added by extending `chrome.rs` with version-specific tables, not by
    /// changing this constructor's shape).
    pub fn chrome_143(force_http1: bool) -> Self {
        let alpn_protocols = if force_http1 {
            chrome::ALPN_PROTOCOLS_H1_ONLY.to_vec()
        } else {
            chrome::ALPN_PROTOCOLS_H2_H1.to_vec()
        };

        Self {
            chrome_major: 143,
            full_version: "143.0.7339.0".to_string(),

            cipher_suites: chrome::CIPHER_SUITES.to_vec(),
            named_groups: chrome::NAMED_GROUPS.to_vec(),
            signature_algorithms: chrome::SIGNATURE_ALGORITHMS.to_vec(),
            extension_order: chrome::EXTENSION_ORDER.to_vec(),

            features: FeatureFlags {
                grease: true,
                extension_permutation: false,
                certificate_compression_brotli: true,
                encrypted_client_hello: false,
                alps_new_codepoint: true,
            },
            alpn_protocols,
            record_size_limit: chrome::RECORD_SIZE_LIMIT,
            key_shares_count: chrome::KEY_SHARES_COUNT,

            settings: SettingsProfile {
                header_table_size: Some(chrome::SETTINGS_HEADER_TABLE_SIZE),
                enable_push: Some(chrome::SETTINGS_ENABLE_PUSH),
                initial_window_size: Some(chrome::SETTINGS_INITIAL_WINDOW_SIZE),
                max_header_list_size: Some(chrome::SETTINGS_MAX_HEADER_LIST_SIZE),
                connection_window_update_increment: chrome::CONNECTION_WINDOW_UPDATE_INCREMENT,
            },
            pseudo_header_order: PseudoHeaderOrder::Masp,

            sec_ch_ua: SecChUaGenerator::new(143),
            quic_transport_params: chrome::QUIC_TRANSPORT_PARAMS,
        }
    }

    /// User-Agent string matching this profile's Chrome version.
    pub fn user_agent(&self, platform_token: &str) -> String {
        format!(
            "Mozilla/5.0 ({platform_token}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
            self.full_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_143_enables_h2_and_h1_alpn_by_default() {
        let p = FingerprintProfile::chrome_143(false);
        assert_eq!(p.alpn_protocols, vec!["h2", "http/1.1"]);
    }

    #[test]
    fn force_http1_restricts_alpn() {
        let p = FingerprintProfile::chrome_143(true);
        assert_eq!(p.alpn_protocols, vec!["http/1.1"]);
    }

    #[test]
    fn settings_omit_max_concurrent_streams_and_max_frame_size() {
        let p = FingerprintProfile::chrome_143(false);
        assert!(p.settings.header_table_size.is_some());
        assert!(p.settings.initial_window_size.is_some());
        assert!(p.settings.max_header_list_size.is_some());
    }

    #[test]
    fn masp_pseudo_header_order_is_fixed() {
        let p = FingerprintProfile::chrome_143(false);
        assert_eq!(
            p.pseudo_header_order.order(),
            [":method", ":authority", ":scheme", ":path"]
        );
    }

    #[test]
    fn user_agent_embeds_full_version() {
        let p = FingerprintProfile::chrome_143(false);
        assert!(p.user_agent("Windows NT 10.0; Win64; x64").contains("143.0.7339.0"));
    }
}
