//! HolyTLS: a byte-exact Chrome network-fingerprint HTTP client engine.
//!
//! Impersonates Chrome's TLS ClientHello, HTTP/2 SETTINGS/pseudo-header
//! order, and request-header sequencing on a reactor-based (non-async/await)
//! concurrency core, with connection pooling, DNS/Alt-Svc/cookie/session
//! caching, and off-thread body decompression.
//!
//! The [`Client`] type is the entry point; everything else is the plumbing
//! it composes.

pub mod altsvc;
pub mod buffer;
pub mod client;
pub mod config;
pub mod connection;
pub mod cookie;
pub mod decompress;
pub mod dns;
pub mod error;
pub mod fingerprint;
pub mod http1;
pub mod http2;
pub mod http3;
pub mod pool;
pub mod proxy;
pub mod reactor;
pub mod tls;

pub use client::Client;
pub use config::Config;
pub use connection::Response;
pub use error::{HolyError, Result};
