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

//! HTTP/2 frame push parser: consumes complete frames from a buffer and
//! dispatches to an H2FrameHandler. Unknown frame types are discarded.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::HttpError;

use super::frame::*;
use super::handler::H2FrameHandler;

/// Push parser for HTTP/2 frames. Feed bytes via `receive`; the handler is
/// invoked for each complete frame; a partial frame stays in the buffer.
pub struct H2Parser {
    max_frame_size: usize,
}

impl H2Parser {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Apply SETTINGS_MAX_FRAME_SIZE. Out-of-range values are a settings
    /// validation error handled by the connection before calling this.
    pub fn set_max_frame_size(&mut self, size: usize) {
        debug_assert!((MIN_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&size));
        self.max_frame_size = size;
    }

    /// Consume as many complete frames as possible from buf.
    pub fn receive<H: H2FrameHandler>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Result<(), HttpError> {
        while buf.len() >= FRAME_HEADER_LENGTH {
            let header = {
                let mut peek = &buf[..FRAME_HEADER_LENGTH];
                FrameHeader::decode(&mut peek)
            };
            if header.length > self.max_frame_size {
                return Err(HttpError::H2FrameSize);
            }
            if buf.len() < FRAME_HEADER_LENGTH + header.length {
                return Ok(());
            }
            buf.advance(FRAME_HEADER_LENGTH);
            let payload = buf.split_to(header.length).freeze();
            dispatch_frame(header, payload, handler);
        }
        Ok(())
    }
}

impl Default for H2Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch_frame<H: H2FrameHandler>(header: FrameHeader, payload: Bytes, handler: &mut H) {
    let FrameHeader {
        frame_type,
        flags,
        stream_id,
        ..
    } = header;
    match frame_type {
        TYPE_DATA => parse_data_frame(flags, stream_id, payload, handler),
        TYPE_HEADERS => parse_headers_frame(flags, stream_id, payload, handler),
        TYPE_PRIORITY => parse_priority_frame(stream_id, payload, handler),
        TYPE_RST_STREAM => parse_rst_stream_frame(stream_id, payload, handler),
        TYPE_SETTINGS => parse_settings_frame(flags, stream_id, payload, handler),
        TYPE_PUSH_PROMISE => parse_push_promise_frame(flags, stream_id, payload, handler),
        TYPE_PING => parse_ping_frame(flags, stream_id, payload, handler),
        TYPE_GOAWAY => parse_goaway_frame(stream_id, payload, handler),
        TYPE_WINDOW_UPDATE => parse_window_update_frame(stream_id, payload, handler),
        TYPE_CONTINUATION => parse_continuation_frame(flags, stream_id, payload, handler),
        _ => {} // unknown frame types are read and discarded
    }
}

fn parse_data_frame<H: H2FrameHandler>(flags: u8, stream_id: u32, mut payload: Bytes, handler: &mut H) {
    if stream_id == 0 {
        handler.frame_error(ERROR_PROTOCOL_ERROR, 0, "DATA frame with stream ID 0".into());
        return;
    }
    let end_stream = (flags & FLAG_END_STREAM) != 0;
    let data = if (flags & FLAG_PADDED) != 0 {
        if payload.is_empty() {
            handler.frame_error(ERROR_PROTOCOL_ERROR, stream_id, "DATA frame PADDED but empty".into());
            return;
        }
        let pad_len = payload.get_u8() as usize;
        if payload.len() < pad_len {
            handler.frame_error(
                ERROR_PROTOCOL_ERROR,
                stream_id,
                "DATA frame padding exceeds payload".into(),
            );
            return;
        }
        payload.split_to(payload.len() - pad_len)
    } else {
        payload
    };
    handler.data_frame_received(stream_id, end_stream, data);
}

fn parse_headers_frame<H: H2FrameHandler>(flags: u8, stream_id: u32, mut payload: Bytes, handler: &mut H) {
    if stream_id == 0 {
        handler.frame_error(ERROR_PROTOCOL_ERROR, 0, "HEADERS frame with stream ID 0".into());
        return;
    }
    let end_stream = (flags & FLAG_END_STREAM) != 0;
    let end_headers = (flags & FLAG_END_HEADERS) != 0;
    let priority = (flags & FLAG_PRIORITY) != 0;
    let padded = (flags & FLAG_PADDED) != 0;

    let pad_len = if padded {
        if payload.is_empty() {
            handler.frame_error(
                ERROR_PROTOCOL_ERROR,
                stream_id,
                "HEADERS frame PADDED but no pad length".into(),
            );
            return;
        }
        let pl = payload.get_u8() as usize;
        if payload.len() < pl {
            handler.frame_error(
                ERROR_PROTOCOL_ERROR,
                stream_id,
                "HEADERS frame padding exceeds payload".into(),
            );
            return;
        }
        pl
    } else {
        0
    };

    let (stream_dependency, exclusive, weight) = if priority {
        if payload.len() < 5 {
            handler.frame_error(
                ERROR_FRAME_SIZE_ERROR,
                stream_id,
                "HEADERS frame with PRIORITY too short".into(),
            );
            return;
        }
        let b0 = payload.get_u8();
        let exclusive = (b0 & 0x80) != 0;
        let stream_dependency = ((b0 as u32 & 0x7f) << 24)
            | ((payload.get_u8() as u32) << 16)
            | ((payload.get_u8() as u32) << 8)
            | (payload.get_u8() as u32);
        let weight = payload.get_u8().saturating_add(1);
        (stream_dependency, exclusive, weight)
    } else {
        (0u32, false, 16u8)
    };

    // Header block is the remainder minus trailing padding.
    let header_len = payload.len().saturating_sub(pad_len);
    let header_block = payload.split_to(header_len);
    handler.headers_frame_received(
        stream_id,
        end_stream,
        end_headers,
        stream_dependency,
        exclusive,
        weight,
        header_block,
    );
}

fn parse_priority_frame<H: H2FrameHandler>(stream_id: u32, payload: Bytes, handler: &mut H) {
    if stream_id == 0 {
        handler.frame_error(ERROR_PROTOCOL_ERROR, 0, "PRIORITY frame with stream ID 0".into());
        return;
    }
    if payload.len() != 5 {
        handler.frame_error(
            ERROR_FRAME_SIZE_ERROR,
            stream_id,
            "PRIORITY frame must be 5 bytes".into(),
        );
        return;
    }
    let mut p = payload;
    let b0 = p.get_u8();
    let exclusive = (b0 & 0x80) != 0;
    let stream_dependency = ((b0 as u32 & 0x7f) << 24)
        | ((p.get_u8() as u32) << 16)
        | ((p.get_u8() as u32) << 8)
        | (p.get_u8() as u32);
    let weight = p.get_u8().saturating_add(1);
    handler.priority_frame_received(stream_id, stream_dependency, exclusive, weight);
}

fn parse_rst_stream_frame<H: H2FrameHandler>(stream_id: u32, payload: Bytes, handler: &mut H) {
    if stream_id == 0 {
        handler.frame_error(ERROR_PROTOCOL_ERROR, 0, "RST_STREAM frame with stream ID 0".into());
        return;
    }
    if payload.len() != 4 {
        handler.frame_error(
            ERROR_FRAME_SIZE_ERROR,
            stream_id,
            "RST_STREAM frame must be 4 bytes".into(),
        );
        return;
    }
    let mut p = payload;
    let error_code = p.get_u32();
    handler.rst_stream_frame_received(stream_id, error_code);
}

fn parse_settings_frame<H: H2FrameHandler>(flags: u8, stream_id: u32, payload: Bytes, handler: &mut H) {
    if stream_id != 0 {
        handler.frame_error(
            ERROR_PROTOCOL_ERROR,
            stream_id,
            "SETTINGS frame with non-zero stream ID".into(),
        );
        return;
    }
    let ack = (flags & FLAG_ACK) != 0;
    if ack && !payload.is_empty() {
        handler.frame_error(ERROR_FRAME_SIZE_ERROR, 0, "SETTINGS ACK frame must be empty".into());
        return;
    }
    if payload.len() % 6 != 0 {
        handler.frame_error(
            ERROR_FRAME_SIZE_ERROR,
            0,
            "SETTINGS frame size must be a multiple of 6".into(),
        );
        return;
    }
    let mut settings = Vec::with_capacity(payload.len() / 6);
    let mut p = payload;
    while p.len() >= 6 {
        let id = p.get_u16();
        let value = p.get_u32();
        settings.push((id, value));
    }
    handler.settings_frame_received(ack, settings);
}

fn parse_push_promise_frame<H: H2FrameHandler>(flags: u8, stream_id: u32, mut payload: Bytes, handler: &mut H) {
    if stream_id == 0 {
        handler.frame_error(ERROR_PROTOCOL_ERROR, 0, "PUSH_PROMISE frame with stream ID 0".into());
        return;
    }
    let end_headers = (flags & FLAG_END_HEADERS) != 0;
    let pad_len = if (flags & FLAG_PADDED) != 0 {
        if payload.is_empty() {
            handler.frame_error(
                ERROR_PROTOCOL_ERROR,
                stream_id,
                "PUSH_PROMISE frame PADDED but empty".into(),
            );
            return;
        }
        payload.get_u8() as usize
    } else {
        0
    };
    if payload.len() < 4 + pad_len {
        handler.frame_error(ERROR_FRAME_SIZE_ERROR, stream_id, "PUSH_PROMISE frame too short".into());
        return;
    }
    let promised_stream_id = payload.get_u32() & 0x7fff_ffff;
    let header_block = payload.split_to(payload.len() - pad_len);
    handler.push_promise_frame_received(stream_id, promised_stream_id, end_headers, header_block);
}

fn parse_ping_frame<H: H2FrameHandler>(flags: u8, stream_id: u32, payload: Bytes, handler: &mut H) {
    if stream_id != 0 {
        handler.frame_error(ERROR_PROTOCOL_ERROR, stream_id, "PING frame with non-zero stream ID".into());
        return;
    }
    if payload.len() != 8 {
        handler.frame_error(ERROR_FRAME_SIZE_ERROR, 0, "PING frame must be 8 bytes".into());
        return;
    }
    let ack = (flags & FLAG_ACK) != 0;
    let mut p = payload;
    let opaque = p.get_u64();
    handler.ping_frame_received(ack, opaque);
}

fn parse_goaway_frame<H: H2FrameHandler>(stream_id: u32, payload: Bytes, handler: &mut H) {
    if stream_id != 0 {
        handler.frame_error(ERROR_PROTOCOL_ERROR, stream_id, "GOAWAY frame with non-zero stream ID".into());
        return;
    }
    if payload.len() < 8 {
        handler.frame_error(ERROR_FRAME_SIZE_ERROR, 0, "GOAWAY frame must be at least 8 bytes".into());
        return;
    }
    let mut p = payload;
    let last_stream_id = p.get_u32() & 0x7fff_ffff;
    let error_code = p.get_u32();
    handler.goaway_frame_received(last_stream_id, error_code, p);
}

fn parse_window_update_frame<H: H2FrameHandler>(stream_id: u32, payload: Bytes, handler: &mut H) {
    if payload.len() != 4 {
        handler.frame_error(
            ERROR_FRAME_SIZE_ERROR,
            stream_id,
            "WINDOW_UPDATE frame must be 4 bytes".into(),
        );
        return;
    }
    let mut p = payload;
    let increment = p.get_u32() & 0x7fff_ffff;
    if increment == 0 {
        handler.frame_error(
            ERROR_PROTOCOL_ERROR,
            stream_id,
            "WINDOW_UPDATE increment must be non-zero".into(),
        );
        return;
    }
    handler.window_update_frame_received(stream_id, increment);
}

fn parse_continuation_frame<H: H2FrameHandler>(flags: u8, stream_id: u32, payload: Bytes, handler: &mut H) {
    if stream_id == 0 {
        handler.frame_error(ERROR_PROTOCOL_ERROR, 0, "CONTINUATION frame with stream ID 0".into());
        return;
    }
    let end_headers = (flags & FLAG_END_HEADERS) != 0;
    handler.continuation_frame_received(stream_id, end_headers, payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[derive(Default)]
    struct Collected {
        data: Vec<(u32, bool, Vec<u8>)>,
        headers: Vec<(u32, bool, bool, Vec<u8>)>,
        settings: Vec<(bool, Vec<(u16, u32)>)>,
        pings: Vec<(bool, u64)>,
        goaways: Vec<(u32, u32)>,
        window_updates: Vec<(u32, u32)>,
        rsts: Vec<(u32, u32)>,
        errors: Vec<(u32, u32, String)>,
    }

    impl H2FrameHandler for Collected {
        fn data_frame_received(&mut self, stream_id: u32, end_stream: bool, data: Bytes) {
            self.data.push((stream_id, end_stream, data.to_vec()));
        }
        fn headers_frame_received(
            &mut self,
            stream_id: u32,
            end_stream: bool,
            end_headers: bool,
            _dep: u32,
            _exclusive: bool,
            _weight: u8,
            block: Bytes,
        ) {
            self.headers.push((stream_id, end_stream, end_headers, block.to_vec()));
        }
        fn priority_frame_received(&mut self, _: u32, _: u32, _: bool, _: u8) {}
        fn rst_stream_frame_received(&mut self, stream_id: u32, error_code: u32) {
            self.rsts.push((stream_id, error_code));
        }
        fn settings_frame_received(&mut self, ack: bool, settings: Vec<(u16, u32)>) {
            self.settings.push((ack, settings));
        }
        fn push_promise_frame_received(&mut self, _: u32, _: u32, _: bool, _: Bytes) {}
        fn ping_frame_received(&mut self, ack: bool, opaque: u64) {
            self.pings.push((ack, opaque));
        }
        fn goaway_frame_received(&mut self, last: u32, code: u32, _debug: Bytes) {
            self.goaways.push((last, code));
        }
        fn window_update_frame_received(&mut self, stream_id: u32, inc: u32) {
            self.window_updates.push((stream_id, inc));
        }
        fn continuation_frame_received(&mut self, _: u32, _: bool, _: Bytes) {}
        fn frame_error(&mut self, code: u32, stream_id: u32, message: String) {
            self.errors.push((code, stream_id, message));
        }
    }

    fn frame(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameHeader {
            length: payload.len(),
            frame_type,
            flags,
            stream_id,
        }
        .encode(&mut buf);
        buf.put_slice(payload);
        buf
    }

    #[test]
    fn data_frame_roundtrip() {
        let mut buf = frame(TYPE_DATA, FLAG_END_STREAM, 1, b"hello");
        let mut parser = H2Parser::new();
        let mut out = Collected::default();
        parser.receive(&mut buf, &mut out).unwrap();
        assert_eq!(out.data, vec![(1, true, b"hello".to_vec())]);
    }

    #[test]
    fn padded_data_frame_strips_padding() {
        let mut payload = vec![3u8]; // pad length
        payload.extend_from_slice(b"body");
        payload.extend_from_slice(&[0, 0, 0]);
        let mut buf = frame(TYPE_DATA, FLAG_PADDED, 3, &payload);
        let mut parser = H2Parser::new();
        let mut out = Collected::default();
        parser.receive(&mut buf, &mut out).unwrap();
        assert_eq!(out.data, vec![(3, false, b"body".to_vec())]);
    }

    #[test]
    fn partial_frame_waits() {
        let full = frame(TYPE_DATA, 0, 1, b"abcdef");
        let mut parser = H2Parser::new();
        let mut out = Collected::default();
        let mut buf = BytesMut::from(&full[..7]);
        parser.receive(&mut buf, &mut out).unwrap();
        assert!(out.data.is_empty());
        buf.extend_from_slice(&full[7..]);
        parser.receive(&mut buf, &mut out).unwrap();
        assert_eq!(out.data.len(), 1);
    }

    #[test]
    fn settings_pairs() {
        let mut payload = BytesMut::new();
        payload.put_u16(SETTINGS_MAX_CONCURRENT_STREAMS);
        payload.put_u32(100);
        payload.put_u16(SETTINGS_INITIAL_WINDOW_SIZE);
        payload.put_u32(65_535);
        let mut buf = frame(TYPE_SETTINGS, 0, 0, &payload);
        let mut parser = H2Parser::new();
        let mut out = Collected::default();
        parser.receive(&mut buf, &mut out).unwrap();
        assert_eq!(
            out.settings,
            vec![(false, vec![
                (SETTINGS_MAX_CONCURRENT_STREAMS, 100),
                (SETTINGS_INITIAL_WINDOW_SIZE, 65_535)
            ])]
        );
    }

    #[test]
    fn unknown_frame_type_skipped() {
        let mut buf = frame(0x42, 0, 7, b"mystery");
        buf.extend_from_slice(&frame(TYPE_PING, 0, 0, &[0; 8]));
        let mut parser = H2Parser::new();
        let mut out = Collected::default();
        parser.receive(&mut buf, &mut out).unwrap();
        assert!(out.errors.is_empty());
        assert_eq!(out.pings, vec![(false, 0)]);
    }

    #[test]
    fn oversized_frame_is_connection_error() {
        let mut buf = BytesMut::new();
        FrameHeader {
            length: DEFAULT_MAX_FRAME_SIZE + 1,
            frame_type: TYPE_DATA,
            flags: 0,
            stream_id: 1,
        }
        .encode(&mut buf);
        let mut parser = H2Parser::new();
        let mut out = Collected::default();
        assert!(matches!(
            parser.receive(&mut buf, &mut out),
            Err(HttpError::H2FrameSize)
        ));
    }

    #[test]
    fn zero_window_increment_flagged() {
        let mut buf = frame(TYPE_WINDOW_UPDATE, 0, 5, &[0, 0, 0, 0]);
        let mut parser = H2Parser::new();
        let mut out = Collected::default();
        parser.receive(&mut buf, &mut out).unwrap();
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].0, ERROR_PROTOCOL_ERROR);
    }

    #[test]
    fn goaway_fields() {
        let mut payload = BytesMut::new();
        payload.put_u32(5);
        payload.put_u32(ERROR_ENHANCE_YOUR_CALM);
        payload.put_slice(b"calm down");
        let mut buf = frame(TYPE_GOAWAY, 0, 0, &payload);
        let mut parser = H2Parser::new();
        let mut out = Collected::default();
        parser.receive(&mut buf, &mut out).unwrap();
        assert_eq!(out.goaways, vec![(5, ERROR_ENHANCE_YOUR_CALM)]);
    }
}
