/*
 * parser.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of zhttp, a multi-protocol HTTP client library.
 *
 * zhttp is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * zhttp is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with zhttp.  If not, see <http://www.gnu.org/licenses/>.
 */

//! HTTP/1.1 response push parser: status line, headers, body framed by
//! Content-Length, chunked coding, or connection close.

use bytes::{Buf, BytesMut};

use crate::error::HttpError;
use crate::headers::HeaderMap;
use crate::protocol::http::response::Version;

/// Total bytes accepted for the status line and header section.
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Callback for HTTP/1.1 response events. The engine implements this and
/// assembles the Response.
pub trait H1ResponseHandler {
    fn status(&mut self, version: Version, code: u16, reason: Option<&str>);
    fn header(&mut self, name: &str, value: &str);
    fn start_body(&mut self);
    fn body_chunk(&mut self, data: &[u8]);
    fn end_body(&mut self);
    fn trailer(&mut self, name: &str, value: &str);
    fn complete(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Idle,
    StatusLine,
    Headers,
    /// Headers done; the engine must call set_body_mode() before feeding more.
    HeadersComplete,
    Body,
    ChunkSize,
    ChunkData,
    ChunkDataEnd,
    ChunkTrailer,
}

/// Push parser for an HTTP/1.1 response. Feed bytes via `receive`; the
/// handler is invoked as complete tokens are parsed; partial data stays in
/// the buffer.
pub struct ResponseParser {
    state: ParseState,
    /// Content-Length when known (-1 for chunked or read-until-close).
    content_length: i64,
    bytes_received: i64,
    chunk_remaining: usize,
    header_bytes: usize,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::StatusLine,
            content_length: -1,
            bytes_received: 0,
            chunk_remaining: 0,
            header_bytes: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ParseState::StatusLine;
        self.content_length = -1;
        self.bytes_received = 0;
        self.chunk_remaining = 0;
        self.header_bytes = 0;
    }

    fn find_crlf(buf: &[u8]) -> Option<usize> {
        buf.windows(2).position(|w| w == b"\r\n")
    }

    fn take_line(&mut self, buf: &mut BytesMut) -> Result<Option<BytesMut>, HttpError> {
        let line_end = match Self::find_crlf(buf) {
            Some(n) => n,
            None => {
                if buf.len() > MAX_HEADER_BYTES {
                    return Err(HttpError::HeadersTooLarge);
                }
                return Ok(None);
            }
        };
        self.header_bytes += line_end + 2;
        if self.header_bytes > MAX_HEADER_BYTES {
            return Err(HttpError::HeadersTooLarge);
        }
        Ok(Some(buf.split_to(line_end + 2)))
    }

    /// Consume and parse as much as possible from buf.
    pub fn receive<H: H1ResponseHandler>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Result<(), HttpError> {
        while !buf.is_empty() {
            match self.state {
                ParseState::StatusLine => {
                    let line = match self.take_line(buf)? {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    let line_str = std::str::from_utf8(&line[..line.len() - 2])
                        .map_err(|_| HttpError::InvalidStatusLine)?;
                    let (version, code, reason) = parse_status_line(line_str)?;
                    let reason = if reason.is_empty() { None } else { Some(reason.as_str()) };
                    handler.status(version, code, reason);
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let line = match self.take_line(buf)? {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    if line.len() == 2 {
                        self.state = ParseState::HeadersComplete;
                        return Ok(());
                    }
                    let line_str = std::str::from_utf8(&line[..line.len() - 2])
                        .map_err(|_| HttpError::InvalidHeader("header is not UTF-8".into()))?;
                    let (name, value) = parse_header_line(line_str)?;
                    handler.header(&name, &value);
                }
                ParseState::Body => {
                    if self.content_length >= 0 {
                        let remaining = (self.content_length - self.bytes_received) as usize;
                        let take = remaining.min(buf.len());
                        if take > 0 {
                            let chunk = buf.split_to(take);
                            handler.body_chunk(&chunk);
                            self.bytes_received += take as i64;
                        }
                        if self.bytes_received >= self.content_length {
                            handler.end_body();
                            handler.complete();
                            self.state = ParseState::Idle;
                        }
                    } else {
                        // Close-delimited: deliver everything; finish_eof()
                        // ends the message.
                        let chunk = buf.split_to(buf.len());
                        handler.body_chunk(&chunk);
                        return Ok(());
                    }
                }
                ParseState::ChunkSize => {
                    let line = match self.take_line_unbounded(buf) {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    let line_str = std::str::from_utf8(&line[..line.len() - 2]).map_err(|_| {
                        HttpError::ChunkedEncodingError("chunk size line is not ASCII".into())
                    })?;
                    let hex_part = line_str.split(';').next().unwrap_or("").trim();
                    let size = usize::from_str_radix(hex_part, 16).map_err(|_| {
                        HttpError::ChunkedEncodingError(format!("bad chunk size: {:?}", hex_part))
                    })?;
                    if size == 0 {
                        self.state = ParseState::ChunkTrailer;
                    } else {
                        self.chunk_remaining = size;
                        self.state = ParseState::ChunkData;
                    }
                }
                ParseState::ChunkData => {
                    let take = self.chunk_remaining.min(buf.len());
                    if take > 0 {
                        let chunk = buf.split_to(take);
                        handler.body_chunk(&chunk);
                        self.chunk_remaining -= take;
                    }
                    if self.chunk_remaining == 0 {
                        self.state = ParseState::ChunkDataEnd;
                    } else {
                        return Ok(());
                    }
                }
                ParseState::ChunkDataEnd => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(HttpError::ChunkedEncodingError(
                            "missing CRLF after chunk data".into(),
                        ));
                    }
                    buf.advance(2);
                    self.state = ParseState::ChunkSize;
                }
                ParseState::ChunkTrailer => {
                    let line = match self.take_line_unbounded(buf) {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    if line.len() == 2 {
                        handler.end_body();
                        handler.complete();
                        self.state = ParseState::Idle;
                    } else {
                        let line_str = std::str::from_utf8(&line[..line.len() - 2]).map_err(|_| {
                            HttpError::ChunkedEncodingError("trailer is not UTF-8".into())
                        })?;
                        if let Ok((name, value)) = parse_header_line(line_str) {
                            handler.trailer(&name, &value);
                        }
                    }
                }
                ParseState::HeadersComplete => return Ok(()),
                ParseState::Idle => return Ok(()),
            }
        }
        Ok(())
    }

    /// Body-phase lines are not subject to the header size budget.
    fn take_line_unbounded(&mut self, buf: &mut BytesMut) -> Option<BytesMut> {
        let line_end = Self::find_crlf(buf)?;
        Some(buf.split_to(line_end + 2))
    }

    /// Called by the engine once headers are parsed (state HeadersComplete).
    /// `has_body` is false for HEAD responses and 1xx/204/304 statuses.
    pub fn set_body_mode(&mut self, content_length: Option<u64>, chunked: bool, has_body: bool) {
        if self.state != ParseState::HeadersComplete {
            return;
        }
        if !has_body {
            self.state = ParseState::Idle;
            return;
        }
        if chunked {
            self.content_length = -1;
            self.state = ParseState::ChunkSize;
        } else if let Some(cl) = content_length {
            self.content_length = cl as i64;
            self.bytes_received = 0;
            if cl == 0 {
                self.state = ParseState::Idle;
            } else {
                self.state = ParseState::Body;
            }
        } else {
            self.content_length = -1;
            self.state = ParseState::Body; // read until close
        }
    }

    /// Signal EOF from the transport. Legal only for a close-delimited body;
    /// anywhere else the peer hung up mid-message.
    pub fn finish_eof<H: H1ResponseHandler>(&mut self, handler: &mut H) -> Result<(), HttpError> {
        match self.state {
            ParseState::Body if self.content_length < 0 => {
                handler.end_body();
                handler.complete();
                self.state = ParseState::Idle;
                Ok(())
            }
            ParseState::Idle => Ok(()),
            _ => Err(HttpError::UnexpectedEof),
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a status line into version, status code, and reason phrase.
pub fn parse_status_line(line: &str) -> Result<(Version, u16, String), HttpError> {
    let mut parts = line.splitn(3, ' ');
    let version_str = parts.next().ok_or(HttpError::InvalidStatusLine)?;
    let version = match version_str {
        "HTTP/1.1" => Version::Http11,
        "HTTP/1.0" => Version::Http10,
        v if v.starts_with("HTTP/") => Version::Http11,
        _ => return Err(HttpError::InvalidStatusLine),
    };
    let code: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(HttpError::InvalidStatusLine)?;
    if !(100..=599).contains(&code) {
        return Err(HttpError::InvalidStatusLine);
    }
    let reason = parts.next().unwrap_or("").to_string();
    Ok((version, code, reason))
}

/// Split a header line on the first colon, trimming SP/HTAB around the name
/// and value. An empty name or a missing colon is an error.
pub fn parse_header_line(line: &str) -> Result<(String, String), HttpError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| HttpError::InvalidHeader(format!("no colon in {:?}", line)))?;
    let name = name.trim_matches([' ', '\t']);
    if name.is_empty() {
        return Err(HttpError::InvalidHeader("empty header name".into()));
    }
    let value = value.trim_matches([' ', '\t']);
    Ok((name.to_string(), value.to_string()))
}

/// True when Transfer-Encoding includes "chunked" (case-insensitive).
pub fn is_chunked_encoding(headers: &HeaderMap) -> bool {
    headers
        .get_all("transfer-encoding")
        .iter()
        .any(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("chunked")))
}

/// Decode Content-Length. Duplicate headers must agree; non-decimal values
/// are rejected.
pub fn get_content_length(headers: &HeaderMap) -> Result<Option<u64>, HttpError> {
    let values = headers.get_all("content-length");
    if values.is_empty() {
        return Ok(None);
    }
    let first: u64 = values[0]
        .trim()
        .parse()
        .map_err(|_| HttpError::InvalidContentLength)?;
    for v in &values[1..] {
        let n: u64 = v.trim().parse().map_err(|_| HttpError::InvalidContentLength)?;
        if n != first {
            return Err(HttpError::InvalidContentLength);
        }
    }
    Ok(Some(first))
}

/// Keep-alive decision: 1.0 closes unless `Connection: keep-alive`; 1.1
/// keeps unless `Connection: close`; 2.x/3.x ignore the header.
pub fn should_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let connection = headers.get("connection").unwrap_or("");
    let has_token = |token: &str| {
        connection
            .split(',')
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };
    match version {
        Version::Http10 => has_token("keep-alive"),
        Version::Http11 => !has_token("close"),
        Version::H2 | Version::H3 => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Events {
        status: Option<(Version, u16, Option<String>)>,
        headers: Vec<(String, String)>,
        trailers: Vec<(String, String)>,
        body: Vec<u8>,
        body_started: bool,
        body_ended: bool,
        completed: bool,
    }

    impl H1ResponseHandler for Events {
        fn status(&mut self, version: Version, code: u16, reason: Option<&str>) {
            self.status = Some((version, code, reason.map(|s| s.to_string())));
        }
        fn header(&mut self, name: &str, value: &str) {
            self.headers.push((name.to_string(), value.to_string()));
        }
        fn start_body(&mut self) {
            self.body_started = true;
        }
        fn body_chunk(&mut self, data: &[u8]) {
            self.body.extend_from_slice(data);
        }
        fn end_body(&mut self) {
            self.body_ended = true;
        }
        fn trailer(&mut self, name: &str, value: &str) {
            self.trailers.push((name.to_string(), value.to_string()));
        }
        fn complete(&mut self) {
            self.completed = true;
        }
    }

    fn run_parser(wire: &[u8], content_length: Option<u64>, chunked: bool) -> Events {
        let mut parser = ResponseParser::new();
        let mut events = Events::default();
        let mut buf = BytesMut::from(wire);
        parser.receive(&mut buf, &mut events).unwrap();
        assert_eq!(parser.state(), ParseState::HeadersComplete);
        parser.set_body_mode(content_length, chunked, true);
        parser.receive(&mut buf, &mut events).unwrap();
        events
    }

    #[test]
    fn status_line_literal() {
        let (version, code, reason) = parse_status_line("HTTP/1.1 200 OK").unwrap();
        assert_eq!(version, Version::Http11);
        assert_eq!(code, 200);
        assert_eq!(reason, "OK");
    }

    #[test]
    fn status_line_no_reason() {
        let (_, code, reason) = parse_status_line("HTTP/1.1 204").unwrap();
        assert_eq!(code, 204);
        assert_eq!(reason, "");
    }

    #[test]
    fn status_line_rejects_garbage() {
        assert!(parse_status_line("ICY 200 OK").is_err());
        assert!(parse_status_line("HTTP/1.1 abc OK").is_err());
        assert!(parse_status_line("HTTP/1.1 999 OK").is_err());
        assert!(parse_status_line("HTTP/1.1").is_err());
    }

    #[test]
    fn header_line_trimming() {
        let (name, value) = parse_header_line("  Authorization  :   Bearer token123   ").unwrap();
        assert_eq!(name, "Authorization");
        assert_eq!(value, "Bearer token123");
    }

    #[test]
    fn header_line_rejects_bad() {
        assert!(parse_header_line("no colon here").is_err());
        assert!(parse_header_line(": empty name").is_err());
    }

    #[test]
    fn content_length_framing() {
        let events = run_parser(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
            Some(5),
            false,
        );
        assert_eq!(events.status, Some((Version::Http11, 200, Some("OK".into()))));
        assert_eq!(events.headers, vec![("Content-Length".to_string(), "5".to_string())]);
        assert_eq!(events.body, b"hello");
        assert!(events.completed);
    }

    #[test]
    fn chunked_framing_with_trailer() {
        let events = run_parser(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n7\r\n, World\r\n1\r\n!\r\n0\r\nX-T: v\r\n\r\n",
            None,
            true,
        );
        assert_eq!(events.body, b"Hello, World!");
        assert_eq!(events.trailers, vec![("X-T".to_string(), "v".to_string())]);
        assert!(events.completed);
    }

    #[test]
    fn close_delimited_body() {
        let mut parser = ResponseParser::new();
        let mut events = Events::default();
        let mut buf = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\nsome data"[..]);
        parser.receive(&mut buf, &mut events).unwrap();
        parser.set_body_mode(None, false, true);
        parser.receive(&mut buf, &mut events).unwrap();
        assert!(!events.completed);
        parser.finish_eof(&mut events).unwrap();
        assert_eq!(events.body, b"some data");
        assert!(events.completed);
    }

    #[test]
    fn eof_mid_length_body_is_error() {
        let mut parser = ResponseParser::new();
        let mut events = Events::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\n\r\nhel"[..]);
        parser.receive(&mut buf, &mut events).unwrap();
        parser.set_body_mode(Some(5), false, true);
        parser.receive(&mut buf, &mut events).unwrap();
        assert!(parser.finish_eof(&mut events).is_err());
    }

    #[test]
    fn no_body_statuses_complete_immediately() {
        let mut parser = ResponseParser::new();
        let mut events = Events::default();
        let mut buf = BytesMut::from(&b"HTTP/1.1 304 Not Modified\r\nContent-Length: 100\r\n\r\n"[..]);
        parser.receive(&mut buf, &mut events).unwrap();
        parser.set_body_mode(Some(100), false, false);
        assert_eq!(parser.state(), ParseState::Idle);
    }

    #[test]
    fn byte_at_a_time_feed() {
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nxyz";
        let mut parser = ResponseParser::new();
        let mut events = Events::default();
        let mut buf = BytesMut::new();
        for b in wire.iter() {
            buf.extend_from_slice(&[*b]);
            parser.receive(&mut buf, &mut events).unwrap();
            if parser.state() == ParseState::HeadersComplete {
                parser.set_body_mode(Some(3), false, true);
            }
        }
        assert_eq!(events.body, b"xyz");
        assert!(events.completed);
    }

    #[test]
    fn keep_alive_defaults() {
        let mut h = HeaderMap::new();
        assert!(should_keep_alive(Version::Http11, &h));
        assert!(!should_keep_alive(Version::Http10, &h));
        h.set("Connection", "close");
        assert!(!should_keep_alive(Version::Http11, &h));
        h.set("Connection", "keep-alive");
        assert!(should_keep_alive(Version::Http10, &h));
        h.set("Connection", "close");
        assert!(should_keep_alive(Version::H2, &h));
    }

    #[test]
    fn chunked_detection() {
        let mut h = HeaderMap::new();
        h.set("Transfer-Encoding", "gzip, Chunked");
        assert!(is_chunked_encoding(&h));
        h.set("Transfer-Encoding", "gzip");
        assert!(!is_chunked_encoding(&h));
    }

    #[test]
    fn content_length_validation() {
        let mut h = HeaderMap::new();
        h.append("Content-Length", "42");
        assert_eq!(get_content_length(&h).unwrap(), Some(42));
        h.append("Content-Length", "42");
        assert_eq!(get_content_length(&h).unwrap(), Some(42));
        h.append("Content-Length", "7");
        assert!(get_content_length(&h).is_err());
        let mut bad = HeaderMap::new();
        bad.append("Content-Length", "abc");
        assert!(get_content_length(&bad).is_err());
    }
}
