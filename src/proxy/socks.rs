//! SOCKS4 / SOCKS4a / SOCKS5 / SOCKS5h proxy handshakes (spec §4.B).
//!
//! Grounded on the original `holytls` `src/holytls/proxy/socks_proxy.cc`:
//! small, explicit per-variant state machines fed bytes by the reactor,
//! mirroring `HttpConnectTunnel`'s shape.

use std::net::Ipv4Addr;

use crate::error::{HolyError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksVariant {
    V4,
    V4a,
    V5,
    V5h,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SendingGreeting,
    AwaitingMethodSelection,
    SendingAuth,
    AwaitingAuthResult,
    SendingConnect,
    AwaitingConnectResult,
    Established,
    Failed,
}

pub struct SocksTunnel {
    variant: SocksVariant,
    state: State,
    target_host: String,
    target_port: u16,
    username: Option<String>,
    password: Option<String>,
    response_buf: Vec<u8>,
}

impl SocksTunnel {
    pub fn new(
        variant: SocksVariant,
        target_host: &str,
        target_port: u16,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            variant,
            state: State::SendingGreeting,
            target_host: target_host.to_string(),
            target_port,
            username,
            password,
            response_buf: Vec::new(),
        }
    }

    /// The first bytes to write once the TCP connection to the proxy
    /// completes.
    pub fn initial_bytes(&mut self) -> Vec<u8> {
        match self.variant {
            SocksVariant::V4 | SocksVariant::V4a => {
                self.state = State::AwaitingConnectResult;
                self.socks4_connect_request()
            }
            SocksVariant::V5 | SocksVariant::V5h => {
                self.state = State::AwaitingMethodSelection;
                self.socks5_greeting()
            }
        }
    }

    fn socks4_connect_request(&self) -> Vec<u8> {
        let mut req = vec![0x04, 0x01];
        req.extend_from_slice(&self.target_port.to_be_bytes());

        let resolved = self.target_host.parse::<Ipv4Addr>().ok();
        let use_v4a = self.variant == SocksVariant::V4a || resolved.is_none();

        if use_v4a {
            // SOCKS4a: invalid IP (0.0.0.x) signals "resolve this hostname yourself".
            req.extend_from_slice(&[0, 0, 0, 1]);
        } else {
            req.extend_from_slice(&resolved.unwrap().octets());
        }
        req.push(0); // empty userid
        if use_v4a {
            req.extend_from_slice(self.target_host.as_bytes());
            req.push(0);
        }
        req
    }

    fn socks5_greeting(&self) -> Vec<u8> {
        if self.username.is_some() {
            vec![0x05, 0x02, 0x00, 0x02] // no-auth, user/pass
        } else {
            vec![0x05, 0x01, 0x00]
        }
    }

    fn socks5_auth_request(&self) -> Vec<u8> {
        let user = self.username.clone().unwrap_or_default();
        let pass = self.password.clone().unwrap_or_default();
        let mut req = vec![0x01, user.len() as u8];
        req.extend_from_slice(user.as_bytes());
        req.push(pass.len() as u8);
        req.extend_from_slice(pass.as_bytes());
        req
    }

    fn socks5_connect_request(&self) -> Vec<u8> {
        let mut req = vec![0x05, 0x01, 0x00];
        let resolve_remotely = self.variant == SocksVariant::V5h || self.target_host.parse::<Ipv4Addr>().is_err();

        if resolve_remotely {
            req.push(0x03); // domain name
            req.push(self.target_host.len() as u8);
            req.extend_from_slice(self.target_host.as_bytes());
        } else {
            req.push(0x01); // IPv4
            req.extend_from_slice(&self.target_host.parse::<Ipv4Addr>().unwrap().octets());
        }
        req.extend_from_slice(&self.target_port.to_be_bytes());
        req
    }

    /// Feeds proxy-socket bytes; returns the next bytes to write (if any)
    /// and whether the tunnel is now established.
    pub fn on_readable(&mut self, data: &[u8]) -> Result<(Vec<u8>, bool), HolyError> {
        self.response_buf.extend_from_slice(data);

        match self.state {
            State::AwaitingConnectResult if matches!(self.variant, SocksVariant::V4 | SocksVariant::V4a) => {
                if self.response_buf.len() < 8 {
                    return Ok((Vec::new(), false));
                }
                if self.response_buf[1] == 0x5a {
                    self.state = State::Established;
                    Ok((Vec::new(), true))
                } else {
                    self.fail()
                }
            }
            State::AwaitingMethodSelection => {
                if self.response_buf.len() < 2 {
                    return Ok((Vec::new(), false));
                }
                match self.response_buf[1] {
                    0x00 => {
                        self.response_buf.clear();
                        self.state = State::SendingConnect;
                        Ok((self.socks5_connect_request(), false))
                    }
                    0x02 => {
                        self.response_buf.clear();
                        self.state = State::AwaitingAuthResult;
                        Ok((self.socks5_auth_request(), false))
                    }
                    _ => self.fail(),
                }
            }
            State::AwaitingAuthResult => {
                if self.response_buf.len() < 2 {
                    return Ok((Vec::new(), false));
                }
                if self.response_buf[1] == 0x00 {
                    self.response_buf.clear();
                    self.state = State::SendingConnect;
                    Ok((self.socks5_connect_request(), false))
                } else {
                    self.fail()
                }
            }
            State::SendingConnect => {
                // We already emitted the connect request on the prior
                // transition; now waiting for its reply.
                if self.response_buf.len() < 10 {
                    return Ok((Vec::new(), false));
                }
                if self.response_buf[1] == 0x00 {
                    self.state = State::Established;
                    Ok((Vec::new(), true))
                } else {
                    self.fail()
                }
            }
            State::Established => Ok((Vec::new(), true)),
            _ => Ok((Vec::new(), false)),
        }
    }

    fn fail(&mut self) -> Result<(Vec<u8>, bool), HolyError> {
        self.state = State::Failed;
        Err(HolyError::Transport(TransportError::Refused {
            addr: format!("{}:{}", self.target_host, self.target_port),
        }))
    }

    pub fn is_established(&self) -> bool {
        self.state == State::Established
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socks4a_sends_hostname_when_not_an_ip() {
        let mut tunnel = SocksTunnel::new(SocksVariant::V4a, "target.example", 443, None, None);
        let bytes = tunnel.initial_bytes();
        assert_eq!(bytes[0], 0x04);
        assert!(bytes.ends_with(b"target.example\0"));
    }

    #[test]
    fn socks4_success_reply_establishes_tunnel() {
        let mut tunnel = SocksTunnel::new(SocksVariant::V4, "1.2.3.4", 443, None, None);
        tunnel.initial_bytes();
        let (_, established) = tunnel.on_readable(&[0x00, 0x5a, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!(established);
    }

    #[test]
    fn socks4_failure_reply_is_rejected() {
        let mut tunnel = SocksTunnel::new(SocksVariant::V4, "1.2.3.4", 443, None, None);
        tunnel.initial_bytes();
        let result = tunnel.on_readable(&[0x00, 0x5b, 0, 0, 0, 0, 0, 0]);
        assert!(result.is_err());
    }

    #[test]
    fn socks5_without_credentials_requests_no_auth() {
        let mut tunnel = SocksTunnel::new(SocksVariant::V5, "target.example", 443, None, None);
        let greeting = tunnel.initial_bytes();
        assert_eq!(greeting, vec![0x05, 0x01, 0x00]);
    }

    #[test]
    fn socks5_full_handshake_reaches_established() {
        let mut tunnel = SocksTunnel::new(
            SocksVariant::V5,
            "target.example",
            443,
            Some("alice".to_string()),
            Some("secret".to_string()),
        );
        let greeting = tunnel.initial_bytes();
        assert_eq!(greeting, vec![0x05, 0x02, 0x00, 0x02]);

        let (auth_req, done) = tunnel.on_readable(&[0x05, 0x02]).unwrap();
        assert!(!done);
        assert!(!auth_req.is_empty());

        let (connect_req, done) = tunnel.on_readable(&[0x01, 0x00]).unwrap();
        assert!(!done);
        assert!(!connect_req.is_empty());

        let (_, done) = tunnel
            .on_readable(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .unwrap();
        assert!(done);
        assert!(tunnel.is_established());
    }

    #[test]
    fn socks5h_resolves_hostname_remotely_even_for_dotted_quad_like_names() {
        let tunnel = SocksTunnel::new(SocksVariant::V5h, "target.example", 443, None, None);
        let req = tunnel.socks5_connect_request();
        assert_eq!(req[3], 0x03); // domain-name address type
    }
}
