//! HTTP `CONNECT` proxy tunnel (spec §4.B).
//!
//! A tiny request/response state machine driven the same way
//! `TlsConnection` is: fed raw bytes from the reactor, producing an
//! outgoing buffer and a completion signal. Grounded on the original
//! `holytls` `src/holytls/proxy/http_connect.cc`.

use crate::error::{HolyError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SendingRequest,
    ReadingResponse,
    Established,
    Failed,
}

pub struct HttpConnectTunnel {
    state: State,
    target_host: String,
    target_port: u16,
    username: Option<String>,
    password: Option<String>,
    response_buf: Vec<u8>,
}

impl HttpConnectTunnel {
    pub fn new(target_host: &str, target_port: u16, username: Option<String>, password: Option<String>) -> Self {
        Self {
            state: State::SendingRequest,
            target_host: target_host.to_string(),
            target_port,
            username,
            password,
            response_buf: Vec::new(),
        }
    }

    /// The CONNECT request to write to the proxy socket immediately after
    /// the TCP connection to the proxy completes.
    pub fn request_bytes(&mut self) -> Vec<u8> {
        self.state = State::ReadingResponse;
        let authority = format!("{}:{}", self.target_host, self.target_port);
        let mut req = format!(
            "CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\nProxy-Connection: Keep-Alive\r\n"
        );
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            use base64::Engine;
            let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
            req.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
        }
        req.push_str("\r\n");
        req.into_bytes()
    }

    /// Feeds bytes read from the proxy socket; returns `Ok(true)` once the
    /// tunnel is established and subsequent bytes belong to the target TLS
    /// handshake, or `Ok(false)` if more response bytes are needed.
    pub fn on_readable(&mut self, data: &[u8]) -> Result<bool, HolyError> {
        if self.state != State::ReadingResponse {
            return Ok(self.state == State::Established);
        }
        self.response_buf.extend_from_slice(data);

        let Some(header_end) = find_double_crlf(&self.response_buf) else {
            return Ok(false);
        };

        let status_line_end = self.response_buf[..header_end]
            .windows(2)
            .position(|w| w == b"\r\n")
            .unwrap_or(header_end);
        let status_line = String::from_utf8_lossy(&self.response_buf[..status_line_end]);

        let status_code: u16 = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        if (200..300).contains(&status_code) {
            self.state = State::Established;
            Ok(true)
        } else {
            self.state = State::Failed;
            Err(HolyError::Transport(TransportError::Refused {
                addr: format!("{}:{}", self.target_host, self.target_port),
            }))
        }
    }

    /// Any bytes read past the CONNECT response that already belong to the
    /// tunneled stream (pipelined by an aggressive proxy).
    pub fn leftover_after_headers(&self) -> &[u8] {
        match find_double_crlf(&self.response_buf) {
            Some(end) => &self.response_buf[end..],
            None => &[],
        }
    }

    pub fn is_established(&self) -> bool {
        self.state == State::Established
    }
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_connect_response_establishes_tunnel() {
        let mut tunnel = HttpConnectTunnel::new("target.example", 443, None, None);
        let _ = tunnel.request_bytes();
        let established = tunnel.on_readable(b"HTTP/1.1 200 Connection Established\r\n\r\n").unwrap();
        assert!(established);
        assert!(tunnel.is_established());
    }

    #[test]
    fn non_2xx_status_is_rejected() {
        let mut tunnel = HttpConnectTunnel::new("target.example", 443, None, None);
        let _ = tunnel.request_bytes();
        let result = tunnel.on_readable(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n");
        assert!(result.is_err());
    }

    #[test]
    fn partial_headers_wait_for_more_data() {
        let mut tunnel = HttpConnectTunnel::new("target.example", 443, None, None);
        let _ = tunnel.request_bytes();
        let established = tunnel.on_readable(b"HTTP/1.1 200 Conn").unwrap();
        assert!(!established);
        let established = tunnel.on_readable(b"ection Established\r\n\r\n").unwrap();
        assert!(established);
    }

    #[test]
    fn request_includes_proxy_authorization_when_credentials_given() {
        let mut tunnel = HttpConnectTunnel::new(
            "target.example",
            443,
            Some("alice".to_string()),
            Some("secret".to_string()),
        );
        let req = String::from_utf8(tunnel.request_bytes()).unwrap();
        assert!(req.contains("Proxy-Authorization: Basic"));
    }

    #[test]
    fn leftover_bytes_after_headers_are_preserved() {
        let mut tunnel = HttpConnectTunnel::new("target.example", 443, None, None);
        let _ = tunnel.request_bytes();
        tunnel.on_readable(b"HTTP/1.1 200 OK\r\n\r\nEXTRA").unwrap();
        assert_eq!(tunnel.leftover_after_headers(), b"EXTRA");
    }
}
