//! HTTP/1.1 serializer and streaming parser (spec §4.G).
//!
//! No pipelining: one request in flight per connection at a time, matching
//! the original `holytls` `src/holytls/http1/session.cc`. Headers are
//! serialized in caller-supplied order (the `fingerprint::header_order`
//! module decides that order upstream of this type).

use crate::error::{HolyError, RequestError};
use crate::fingerprint::HeaderField;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    ParsingStatusLine,
    ParsingHeaders,
    ParsingBody,
    ParsingChunked,
    Complete,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

enum BodyMode {
    ContentLength(usize),
    Chunked,
    UntilClose,
    None,
}

pub struct Http1Session {
    state: State,
    parse_buf: Vec<u8>,
    response: Response,
    body_mode: BodyMode,
    chunk_remaining: usize,
    bytes_read: usize,
}

impl Http1Session {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            parse_buf: Vec::new(),
            response: Response::default(),
            body_mode: BodyMode::None,
            chunk_remaining: 0,
            bytes_read: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Serializes a request line + headers, in the exact order given.
    pub fn serialize_request(method: &str, path: &str, headers: &[HeaderField], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + body.len());
        out.extend_from_slice(format!("{method} {path} HTTP/1.1\r\n").as_bytes());
        for h in headers {
            out.extend_from_slice(format!("{}: {}\r\n", h.name, h.value).as_bytes());
        }
        if !body.is_empty() {
            out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(body);
        out
    }

    pub fn begin_response(&mut self) {
        self.state = State::ParsingStatusLine;
        self.parse_buf.clear();
        self.response = Response::default();
        self.body_mode = BodyMode::None;
        self.chunk_remaining = 0;
        self.bytes_read = 0;
    }

    /// Feeds bytes read from the socket. Returns `Some(Response)` once a
    /// complete response has been parsed; `None` means more data is needed.
    pub fn feed(&mut self, data: &[u8]) -> Result<Option<Response>, HolyError> {
        self.parse_buf.extend_from_slice(data);

        loop {
            match self.state {
                State::ParsingStatusLine | State::ParsingHeaders => {
                    let Some(header_end) = find_double_crlf(&self.parse_buf) else {
                        return Ok(None);
                    };
                    self.parse_headers(header_end)?;
                    self.parse_buf.drain(..header_end);
                    self.state = match self.body_mode {
                        BodyMode::Chunked => State::ParsingChunked,
                        BodyMode::ContentLength(0) | BodyMode::None => State::Complete,
                        _ => State::ParsingBody,
                    };
                    if self.state == State::Complete {
                        return Ok(Some(self.finish()));
                    }
                }
                State::ParsingBody => {
                    let BodyMode::ContentLength(want) = self.body_mode else { unreachable!() };
                    let remaining = want - self.bytes_read;
                    let take = remaining.min(self.parse_buf.len());
                    self.response.body.extend_from_slice(&self.parse_buf[..take]);
                    self.parse_buf.drain(..take);
                    self.bytes_read += take;
                    if self.bytes_read >= want {
                        return Ok(Some(self.finish()));
                    }
                    return Ok(None);
                }
                State::ParsingChunked => {
                    if !self.advance_chunked()? {
                        return Ok(None);
                    }
                    if self.state == State::Complete {
                        return Ok(Some(self.finish()));
                    }
                }
                State::Complete | State::Error | State::Idle => return Ok(None),
            }
        }
    }

    /// A response has fully parsed: hand it to the caller and return the
    /// session to `Idle` so the connection can submit its next request
    /// (spec §4.K "Connection reuse gate" — no pipelining, one request in
    /// flight at a time).
    fn finish(&mut self) -> Response {
        self.state = State::Idle;
        std::mem::take(&mut self.response)
    }

    fn parse_headers(&mut self, header_end: usize) -> Result<(), HolyError> {
        let text = std::str::from_utf8(&self.parse_buf[..header_end]).map_err(|_| {
            HolyError::Request(RequestError::InvalidHeader("non-UTF-8 response headers".to_string()))
        })?;
        let mut lines = text.split("\r\n");
        let status_line = lines.next().unwrap_or("");
        self.response.status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let mut content_length = None;
        let mut chunked = false;
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                let value = value.trim();
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.parse::<usize>().ok();
                }
                if name.eq_ignore_ascii_case("transfer-encoding") && value.eq_ignore_ascii_case("chunked") {
                    chunked = true;
                }
                self.response.headers.push((name.to_string(), value.to_string()));
            }
        }

        self.body_mode = if chunked {
            BodyMode::Chunked
        } else if let Some(len) = content_length {
            BodyMode::ContentLength(len)
        } else {
            BodyMode::None
        };
        Ok(())
    }

    /// Advances the chunked-body parser by as much as `self.parse_buf`
    /// allows. Returns `true` if progress requires another loop iteration.
    fn advance_chunked(&mut self) -> Result<bool, HolyError> {
        if self.chunk_remaining == 0 {
            let Some(line_end) = self.parse_buf.windows(2).position(|w| w == b"\r\n") else {
                return Ok(false);
            };
            let size_str = std::str::from_utf8(&self.parse_buf[..line_end]).unwrap_or("");
            let size_str = size_str.split(';').next().unwrap_or("0");
            let size = usize::from_str_radix(size_str.trim(), 16).map_err(|_| {
                HolyError::Request(RequestError::InvalidHeader("bad chunk size".to_string()))
            })?;
            self.parse_buf.drain(..line_end + 2);

            if size == 0 {
                // Trailing headers terminated by a blank line; skip them.
                if let Some(end) = find_double_crlf(&self.parse_buf) {
                    self.parse_buf.drain(..end);
                } else if self.parse_buf.len() < 2 {
                    self.parse_buf.clear();
                }
                self.state = State::Complete;
                return Ok(true);
            }
            self.chunk_remaining = size;
        }

        let take = self.chunk_remaining.min(self.parse_buf.len());
        self.response.body.extend_from_slice(&self.parse_buf[..take]);
        self.parse_buf.drain(..take);
        self.chunk_remaining -= take;

        if self.chunk_remaining == 0 {
            // Consume trailing CRLF after the chunk data, if present yet.
            if self.parse_buf.len() >= 2 && &self.parse_buf[..2] == b"\r\n" {
                self.parse_buf.drain(..2);
                return Ok(true);
            }
            if self.parse_buf.len() < 2 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Default for Http1Session {
    fn default() -> Self {
        Self::new()
    }
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::HeaderField;

    #[test]
    fn serialize_request_preserves_header_order() {
        let headers = vec![
            HeaderField { name: "Host".to_string(), value: "example.com".to_string() },
            HeaderField { name: "Accept".to_string(), value: "*/*".to_string() },
        ];
        let bytes = Http1Session::serialize_request("GET", "/", &headers, &[]);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("GET / HTTP/1.1\r\n"));
        let host_idx = text.find("Host:").unwrap();
        let accept_idx = text.find("Accept:").unwrap();
        assert!(host_idx < accept_idx);
    }

    #[test]
    fn content_length_response_parses_fully() {
        let mut session = Http1Session::new();
        session.begin_response();
        let response = session
            .feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
            .unwrap()
            .expect("complete response");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"hello");
    }

    #[test]
    fn partial_response_returns_none_until_complete() {
        let mut session = Http1Session::new();
        session.begin_response();
        assert!(session.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhel").unwrap().is_none());
        let response = session.feed(b"lo").unwrap().expect("now complete");
        assert_eq!(response.body, b"hello");
    }

    #[test]
    fn chunked_response_reassembles_body() {
        let mut session = Http1Session::new();
        session.begin_response();
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let response = session.feed(raw).unwrap().expect("complete response");
        assert_eq!(response.body, b"hello world");
    }

    #[test]
    fn response_with_no_body_markers_completes_immediately() {
        let mut session = Http1Session::new();
        session.begin_response();
        let response = session.feed(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap().expect("complete");
        assert_eq!(response.status, 204);
        assert!(response.body.is_empty());
    }
}
