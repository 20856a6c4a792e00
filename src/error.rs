//! Error taxonomy for the HolyTLS core.
//!
//! Mirrors §7 of the specification: errors are grouped by the layer that
//! detected them, and each variant carries enough context to log usefully
//! without allocating on every hot-path failure.

use std::io;

/// Top-level error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum HolyError {
    #[error("dns: {0}")]
    Dns(#[from] DnsError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("tls: {0}")]
    Tls(#[from] TlsError),

    #[error("http2: {0}")]
    Http2(#[from] Http2Error),

    #[error("request: {0}")]
    Request(#[from] RequestError),

    #[error("pool: {0}")]
    Pool(#[from] PoolError),

    #[error("internal: {0}")]
    Internal(#[from] InternalError),
}

#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("resolution of {host} failed: {source}")]
    ResolutionFailed { host: String, source: io::Error },
    #[error("resolution of {host} timed out after {elapsed_ms}ms")]
    Timeout { host: String, elapsed_ms: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {addr} refused")]
    Refused { addr: String },
    #[error("connection to {addr} reset")]
    Reset { addr: String },
    #[error("connection to {addr} timed out")]
    Timeout { addr: String },
    #[error("network unreachable: {addr}")]
    NetworkUnreachable { addr: String },
    #[error("host unreachable: {addr}")]
    HostUnreachable { addr: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("handshake with {host} failed: {reason}")]
    HandshakeFailed { host: String, reason: String },
    #[error("certificate error for {host}: {reason}")]
    CertificateError { host: String, reason: String },
    #[error("tls protocol error: {0}")]
    ProtocolError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Http2Error {
    #[error("protocol error on stream {stream_id}: {reason}")]
    ProtocolError { stream_id: u32, reason: String },
    #[error("stream {stream_id} error: {reason}")]
    StreamError { stream_id: u32, reason: String },
    #[error("flow control violation on stream {stream_id}")]
    FlowControl { stream_id: u32 },
    #[error("SETTINGS ack not received in time")]
    SettingsTimeout,
    #[error("GOAWAY received, last_stream_id={last_stream_id}, error_code={error_code}")]
    GoAway { last_stream_id: u32, error_code: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
    #[error("request cancelled")]
    Cancelled,
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { limit: u32 },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("connection pool for {host}:{port} exhausted (max {max_connections})")]
    Exhausted {
        host: String,
        port: u16,
        max_connections: usize,
    },
    #[error("no available connection for {host}:{port}")]
    NoAvailableConnection { host: String, port: u16 },
}

#[derive(Debug, thiserror::Error)]
pub enum InternalError {
    #[error("internal bug: {0}")]
    Bug(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("reactor full (max {max_fds} fds)")]
    ReactorFull { max_fds: usize },
}

impl HolyError {
    /// True for errors that are transient and should be retried internally
    /// rather than surfaced to the caller, per §7 "Propagation".
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            HolyError::Dns(DnsError::Timeout { .. })
                | HolyError::Transport(TransportError::Timeout { .. })
        )
    }

    /// True for errors that should close the owning connection and fail
    /// every request queued on it, per §7 "Fatal" classification.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            HolyError::Transport(_)
                | HolyError::Tls(_)
                | HolyError::Http2(Http2Error::GoAway { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, HolyError>;
