/*
 * writer.rs
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

//! HTTP/2 frame writer: serializes frames into a buffer. The caller drains
//! the buffer to the transport.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::*;

/// Accumulates serialized frames. `take_buffer` hands the bytes to the I/O
/// layer; the writer stays usable.
pub struct H2Writer {
    buf: BytesMut,
}

impl H2Writer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(DEFAULT_MAX_FRAME_SIZE + FRAME_HEADER_LENGTH),
        }
    }

    fn frame_header(&mut self, length: usize, frame_type: u8, flags: u8, stream_id: u32) {
        FrameHeader {
            length,
            frame_type,
            flags,
            stream_id,
        }
        .encode(&mut self.buf);
    }

    /// The 24-byte client connection preface. Sent once, before any frame.
    pub fn write_preface(&mut self) {
        self.buf.extend_from_slice(CLIENT_PREFACE);
    }

    /// Append a DATA frame.
    pub fn write_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool) {
        debug_assert!(stream_id != 0);
        let flags = if end_stream { FLAG_END_STREAM } else { 0 };
        self.frame_header(data.len(), TYPE_DATA, flags, stream_id);
        self.buf.extend_from_slice(data);
    }

    /// Append a HEADERS frame (no priority, no padding). The header block
    /// must already be HPACK-encoded and fit in one frame; larger blocks go
    /// through `write_headers` + `write_continuation`.
    pub fn write_headers(
        &mut self,
        stream_id: u32,
        header_block: &[u8],
        end_stream: bool,
        end_headers: bool,
    ) {
        debug_assert!(stream_id != 0);
        let mut flags = 0u8;
        if end_stream {
            flags |= FLAG_END_STREAM;
        }
        if end_headers {
            flags |= FLAG_END_HEADERS;
        }
        self.frame_header(header_block.len(), TYPE_HEADERS, flags, stream_id);
        self.buf.extend_from_slice(header_block);
    }

    /// Append a CONTINUATION frame carrying more of a header block.
    pub fn write_continuation(&mut self, stream_id: u32, fragment: &[u8], end_headers: bool) {
        debug_assert!(stream_id != 0);
        let flags = if end_headers { FLAG_END_HEADERS } else { 0 };
        self.frame_header(fragment.len(), TYPE_CONTINUATION, flags, stream_id);
        self.buf.extend_from_slice(fragment);
    }

    pub fn write_rst_stream(&mut self, stream_id: u32, error_code: u32) {
        debug_assert!(stream_id != 0);
        self.frame_header(4, TYPE_RST_STREAM, 0, stream_id);
        self.buf.put_u32(error_code);
    }

    /// SETTINGS with parameters; empty slice for the bare preface SETTINGS.
    pub fn write_settings(&mut self, settings: &[(u16, u32)]) {
        self.frame_header(settings.len() * 6, TYPE_SETTINGS, 0, 0);
        for (id, value) in settings {
            self.buf.put_u16(*id);
            self.buf.put_u32(*value);
        }
    }

    pub fn write_settings_ack(&mut self) {
        self.frame_header(0, TYPE_SETTINGS, FLAG_ACK, 0);
    }

    pub fn write_ping(&mut self, opaque_data: u64, ack: bool) {
        let flags = if ack { FLAG_ACK } else { 0 };
        self.frame_header(8, TYPE_PING, flags, 0);
        self.buf.put_u64(opaque_data);
    }

    pub fn write_goaway(&mut self, last_stream_id: u32, error_code: u32, debug_data: &[u8]) {
        self.frame_header(8 + debug_data.len(), TYPE_GOAWAY, 0, 0);
        self.buf.put_u32(last_stream_id & 0x7fff_ffff);
        self.buf.put_u32(error_code);
        self.buf.extend_from_slice(debug_data);
    }

    /// WINDOW_UPDATE; stream 0 credits the connection window.
    pub fn write_window_update(&mut self, stream_id: u32, increment: u32) {
        debug_assert!(increment != 0 && increment < (1 << 31));
        self.frame_header(4, TYPE_WINDOW_UPDATE, 0, stream_id);
        self.buf.put_u32(increment);
    }

    /// Take the accumulated bytes; the writer is left empty and reusable.
    pub fn take_buffer(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for H2Writer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_bytes() {
        let mut w = H2Writer::new();
        let mut payload = Vec::new();
        payload.resize(100, 0xaa);
        w.write_data(1, &payload, true);
        let buf = w.take_buffer();
        assert_eq!(&buf[..9], &[0x00, 0x00, 0x64, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(buf.len(), 9 + 100);
        assert!(w.is_empty());
    }

    #[test]
    fn settings_and_ack() {
        let mut w = H2Writer::new();
        w.write_settings(&[(SETTINGS_INITIAL_WINDOW_SIZE, 65_535)]);
        w.write_settings_ack();
        let buf = w.take_buffer();
        // First frame: 6-byte payload.
        assert_eq!(&buf[..9], &[0, 0, 6, TYPE_SETTINGS, 0, 0, 0, 0, 0]);
        assert_eq!(&buf[9..15], &[0x00, 0x04, 0x00, 0x00, 0xff, 0xff]);
        // Second frame: empty ACK.
        assert_eq!(&buf[15..24], &[0, 0, 0, TYPE_SETTINGS, FLAG_ACK, 0, 0, 0, 0]);
    }

    #[test]
    fn preface_then_settings() {
        let mut w = H2Writer::new();
        w.write_preface();
        w.write_settings(&[]);
        let buf = w.take_buffer();
        assert_eq!(&buf[..24], CLIENT_PREFACE);
        assert_eq!(&buf[24..33], &[0, 0, 0, TYPE_SETTINGS, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn window_update_frame() {
        let mut w = H2Writer::new();
        w.write_window_update(0, 32_768);
        let buf = w.take_buffer();
        assert_eq!(buf[3], TYPE_WINDOW_UPDATE);
        assert_eq!(&buf[9..13], &[0x00, 0x00, 0x80, 0x00]);
    }

    #[test]
    fn goaway_masks_reserved_bit() {
        let mut w = H2Writer::new();
        w.write_goaway(0x8000_0005, ERROR_NO_ERROR, b"");
        let buf = w.take_buffer();
        assert_eq!(&buf[9..13], &[0x00, 0x00, 0x00, 0x05]);
    }
}
