//! Recognized configuration options, per spec §6.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Protocol preference resolved at connection-pool acquisition time (§4.L–M).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolPreference {
    Auto,
    Http3Only,
    Http2Preferred,
    Http1Only,
}

impl Default for ProtocolPreference {
    fn default() -> Self {
        ProtocolPreference::Auto
    }
}

/// Which Chrome major version's fingerprint profile to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChromeVersion {
    V120,
    V125,
    V130,
    V131,
    V143,
}

impl Default for ChromeVersion {
    fn default() -> Self {
        ChromeVersion::V143
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub chrome_version: ChromeVersion,
    pub force_http1: bool,
    pub verify_certificates: bool,
    pub ca_bundle_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
    pub enable_session_cache: bool,
    pub session_cache_size: usize,
    pub enable_early_data: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            chrome_version: ChromeVersion::default(),
            force_http1: false,
            verify_certificates: true,
            ca_bundle_path: None,
            client_cert_path: None,
            client_key_path: None,
            enable_session_cache: true,
            session_cache_size: 256,
            enable_early_data: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections_per_host: usize,
    pub max_total_connections: usize,
    #[serde(with = "duration_millis")]
    pub idle_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,
    pub max_streams_per_connection: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_host: 6,
            max_total_connections: 256,
            idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            max_streams_per_connection: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsConfig {
    /// 0 = CPU count.
    pub num_workers: usize,
    pub pin_to_cores: bool,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            pin_to_cores: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    pub servers: Vec<String>,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    #[serde(with = "duration_millis")]
    pub cache_ttl: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyType {
    None,
    Http,
    Socks4,
    Socks4a,
    Socks5,
    Socks5h,
}

impl Default for ProxyType {
    fn default() -> Self {
        ProxyType::None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub proxy_type: ProxyType,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub protocol: ProtocolPreference,
    pub tls: TlsConfig,
    pub pool: PoolConfig,
    pub threads: ThreadsConfig,
    pub dns: DnsConfig,
    pub proxy: ProxyConfig,
    pub alt_svc_enabled: bool,
    pub auto_decompress: bool,
    pub follow_redirects: bool,
    pub max_redirects: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol: ProtocolPreference::default(),
            tls: TlsConfig::default(),
            pool: PoolConfig::default(),
            threads: ThreadsConfig::default(),
            dns: DnsConfig::default(),
            proxy: ProxyConfig::default(),
            alt_svc_enabled: true,
            auto_decompress: true,
            follow_redirects: true,
            max_redirects: 10,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
