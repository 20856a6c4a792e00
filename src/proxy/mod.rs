//! Proxy tunnel protocols: HTTP `CONNECT` and SOCKS4/4a/5/5h (spec §4.B).

mod http_connect;
mod socks;

pub use http_connect::HttpConnectTunnel;
pub use socks::{SocksTunnel, SocksVariant};
