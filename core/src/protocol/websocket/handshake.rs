/*
 * handshake.rs
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

//! WebSocket opening handshake (RFC 6455 §4): GET with Upgrade, 101
//! response, Sec-WebSocket-Accept verification.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::BytesMut;
use sha1::{Digest, Sha1};

use crate::error::HttpError;
use crate::protocol::http::h1::{H1ResponseHandler, ParseState, ResponseParser};
use crate::protocol::http::response::Version;
use crate::url::Url;

/// Magic GUID appended to the client key (RFC 6455 §4.2.2).
const WS_ACCEPT_MAGIC: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Captures the status and Sec-WebSocket-Accept from the 101 response.
struct HandshakeHandler {
    status: Option<u16>,
    accept: Option<String>,
}

impl H1ResponseHandler for HandshakeHandler {
    fn status(&mut self, _version: Version, code: u16, _reason: Option<&str>) {
        self.status = Some(code);
    }

    fn header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("Sec-WebSocket-Accept") {
            self.accept = Some(value.trim().to_string());
        }
    }

    fn start_body(&mut self) {}
    fn body_chunk(&mut self, _data: &[u8]) {}
    fn end_body(&mut self) {}
    fn trailer(&mut self, _name: &str, _value: &str) {}
    fn complete(&mut self) {}
}

/// Generate a new 16-byte random key, base64-encoded for the wire.
pub fn generate_key() -> Result<String, HttpError> {
    let mut raw = [0u8; 16];
    getrandom::getrandom(&mut raw)
        .map_err(|e| HttpError::InvalidData(format!("no entropy for key: {}", e)))?;
    Ok(BASE64.encode(raw))
}

/// Build the upgrade request. The caller writes this to the stream.
pub fn build_handshake_request(url: &Url, key_base64: &str) -> Vec<u8> {
    let mut req = Vec::with_capacity(256);
    req.extend_from_slice(b"GET ");
    req.extend_from_slice(url.request_target().as_bytes());
    req.extend_from_slice(b" HTTP/1.1\r\nHost: ");
    req.extend_from_slice(url.authority().as_bytes());
    req.extend_from_slice(b"\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: ");
    req.extend_from_slice(key_base64.as_bytes());
    req.extend_from_slice(b"\r\nSec-WebSocket-Version: 13\r\n\r\n");
    req
}

/// Expected Sec-WebSocket-Accept for a key:
/// base64(SHA1(key_base64 || MAGIC_GUID)).
pub fn compute_expected_accept(key_base64: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key_base64.as_bytes());
    hasher.update(WS_ACCEPT_MAGIC);
    BASE64.encode(hasher.finalize())
}

/// Parse the server's 101 from the buffer; stops at the end of headers.
/// Returns (status, accept header) once headers are complete.
pub fn parse_101_response(
    parser: &mut ResponseParser,
    buf: &mut BytesMut,
) -> Result<Option<(u16, Option<String>)>, HttpError> {
    let mut handler = HandshakeHandler {
        status: None,
        accept: None,
    };
    parser.receive(buf, &mut handler)?;
    if parser.state() != ParseState::HeadersComplete {
        return Ok(None);
    }
    Ok(Some((handler.status.unwrap_or(0), handler.accept)))
}

/// Verify the server's Sec-WebSocket-Accept against the key we sent.
pub fn verify_accept(accept_header: Option<&str>, key_base64: &str) -> Result<(), HttpError> {
    let expected = compute_expected_accept(key_base64);
    match accept_header {
        Some(h) if h.trim() == expected => Ok(()),
        Some(_) => Err(HttpError::InvalidData("Sec-WebSocket-Accept mismatch".into())),
        None => Err(HttpError::InvalidData("missing Sec-WebSocket-Accept".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6455_accept_vector() {
        // The sample handshake from RFC 6455 §1.3.
        assert_eq!(
            compute_expected_accept("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn request_contains_upgrade_headers() {
        let url = Url::parse("ws://chat.example:8080/room?id=7").unwrap();
        let req = build_handshake_request(&url, "a2V5a2V5a2V5a2V5a2V5a2U=");
        let text = String::from_utf8(req).unwrap();
        assert!(text.starts_with("GET /room?id=7 HTTP/1.1\r\n"));
        assert!(text.contains("Host: chat.example:8080\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains("Sec-WebSocket-Version: 13\r\n"));
    }

    #[test]
    fn verify_accept_matches_and_rejects() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        assert!(verify_accept(Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="), key).is_ok());
        assert!(verify_accept(Some("bogus"), key).is_err());
        assert!(verify_accept(None, key).is_err());
    }

    #[test]
    fn parse_101_extracts_accept() {
        let wire = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        let mut parser = ResponseParser::new();
        let mut buf = BytesMut::from(&wire[..]);
        let (status, accept) = parse_101_response(&mut parser, &mut buf).unwrap().unwrap();
        assert_eq!(status, 101);
        assert_eq!(accept.as_deref(), Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    }

    #[test]
    fn generated_keys_are_distinct() {
        let a = generate_key().unwrap();
        let b = generate_key().unwrap();
        assert_ne!(a, b);
        assert_eq!(BASE64.decode(&a).unwrap().len(), 16);
    }
}
