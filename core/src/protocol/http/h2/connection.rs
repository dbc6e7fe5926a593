/*
 * connection.rs
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

//! HTTP/2 client connection: preface and settings exchange, HPACK at
//! connection scope, stream multiplexing, flow control, GOAWAY handling.
//! One frame read loop serves all streams; requests are issued with
//! `send_request` and complete when their stream closes.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::HttpError;
use crate::headers::HeaderMap;
use crate::protocol::http::hpack;
use crate::protocol::http::request::Method;
use crate::protocol::http::response::{Response, Version};
use crate::url::Url;

use super::frame::*;
use super::handler::H2FrameHandler;
use super::parser::H2Parser;
use super::stream::Stream;
use super::writer::H2Writer;

/// Settings advertised by the peer, applied as they arrive.
#[derive(Debug, Clone, Copy)]
struct PeerSettings {
    header_table_size: u32,
    enable_push: bool,
    max_concurrent_streams: Option<u32>,
    initial_window_size: u32,
    max_frame_size: u32,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: true,
            max_concurrent_streams: None,
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE as u32,
        }
    }
}

/// Control frames queued by the dispatch pass and written afterwards.
enum Control {
    SettingsAck,
    PingAck(u64),
    WindowUpdate(u32, u32),
    Rst(u32, u32),
}

/// Header table size we advertise for responses.
const LOCAL_HEADER_TABLE_SIZE: u32 = 4096;

pub struct H2Connection<S> {
    io: S,
    read_buf: BytesMut,
    parser: H2Parser,
    writer: H2Writer,
    hpack_encoder: hpack::Encoder,
    hpack_decoder: hpack::Decoder,
    streams: HashMap<u32, Stream>,
    /// Client stream ids: odd, strictly increasing.
    next_stream_id: u32,
    peer_settings: PeerSettings,
    conn_send_window: i64,
    conn_recv_window: i64,
    goaway: Option<(u32, u32)>,
    /// In-progress header block awaiting CONTINUATION frames:
    /// (stream id, end_stream, fragments).
    header_block: Option<(u32, bool, BytesMut)>,
    read_timeout: Duration,
    write_timeout: Duration,
    max_body_size: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> H2Connection<S> {
    /// Send the 24-byte preface and our SETTINGS (push disabled), then
    /// return the connection. The server's SETTINGS are applied when its
    /// first frames are read; waiting for them is not required.
    pub async fn handshake(
        io: S,
        read_timeout: Duration,
        write_timeout: Duration,
        max_body_size: usize,
    ) -> Result<Self, HttpError> {
        let mut conn = Self {
            io,
            read_buf: BytesMut::with_capacity(16_384),
            parser: H2Parser::new(),
            writer: H2Writer::new(),
            hpack_encoder: hpack::Encoder::new(4096),
            hpack_decoder: hpack::Decoder::new(LOCAL_HEADER_TABLE_SIZE as usize),
            streams: HashMap::new(),
            next_stream_id: 1,
            peer_settings: PeerSettings::default(),
            conn_send_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            conn_recv_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            goaway: None,
            header_block: None,
            read_timeout,
            write_timeout,
            max_body_size,
        };
        conn.writer.write_preface();
        conn.writer.write_settings(&[
            (SETTINGS_HEADER_TABLE_SIZE, LOCAL_HEADER_TABLE_SIZE),
            (SETTINGS_ENABLE_PUSH, 0),
            (SETTINGS_INITIAL_WINDOW_SIZE, DEFAULT_INITIAL_WINDOW_SIZE),
        ]);
        conn.flush_writer().await?;
        debug!("HTTP/2 connection preface sent");
        Ok(conn)
    }

    /// Whether the connection can carry further requests.
    pub fn can_reuse(&self) -> bool {
        self.goaway.is_none()
    }

    pub fn into_io(self) -> S {
        self.io
    }

    /// Issue one request and read frames until its stream closes. Other
    /// streams on the connection make progress from the same read loop.
    pub async fn send_request(
        &mut self,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<Response, HttpError> {
        if let Some((last_stream_id, error_code)) = self.goaway {
            return Err(HttpError::H2GoAway {
                last_stream_id,
                error_code,
            });
        }
        if let Some(max) = self.peer_settings.max_concurrent_streams {
            let active = self.streams.values().filter(|s| !s.is_closed()).count();
            if active as u32 >= max {
                return Err(HttpError::H2Protocol(
                    "concurrent stream limit reached".into(),
                ));
            }
        }

        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;

        let has_body = body.map(|b| !b.is_empty()).unwrap_or(false);
        let block = self.encode_request_headers(method, url, headers);
        self.write_header_block(stream_id, &block, !has_body);

        let mut stream = Stream::new(
            stream_id,
            self.peer_settings.initial_window_size,
            DEFAULT_INITIAL_WINDOW_SIZE,
        );
        stream.send_headers(!has_body);
        self.streams.insert(stream_id, stream);
        self.flush_writer().await?;
        trace!(stream_id, "request headers sent");

        if let Some(data) = body.filter(|b| !b.is_empty()) {
            self.send_body(stream_id, data).await?;
        }

        // Drive the read loop until this stream finishes.
        loop {
            match self.streams.get(&stream_id) {
                Some(s) if s.is_closed() => break,
                Some(_) => {}
                None => return Err(HttpError::H2Protocol("stream vanished".into())),
            }
            self.read_and_dispatch().await?;
        }

        let stream = self
            .streams
            .remove(&stream_id)
            .ok_or_else(|| HttpError::H2Protocol("stream vanished".into()))?;
        if stream.body_overflow {
            return Err(HttpError::BodyTooLarge);
        }
        if let Some(code) = stream.reset_error {
            if code == ERROR_REFUSED_STREAM {
                if let Some((last_stream_id, error_code)) = self.goaway {
                    return Err(HttpError::H2GoAway {
                        last_stream_id,
                        error_code,
                    });
                }
            }
            return Err(HttpError::H2StreamReset(code));
        }
        self.build_response(stream)
    }

    /// Pseudo-headers first in the fixed encoded order, then the regular
    /// headers lowercased, minus connection-specific ones.
    fn encode_request_headers(&mut self, method: Method, url: &Url, headers: &HeaderMap) -> Bytes {
        let authority = url.authority();
        let target = url.request_target();
        let mut fields: Vec<(String, String)> = vec![
            (":method".into(), method.as_str().to_string()),
            (":path".into(), target),
            (":scheme".into(), url.scheme.as_str().to_string()),
            (":authority".into(), authority),
        ];
        for (name, value) in headers.iter() {
            let lower = name.to_ascii_lowercase();
            // Connection-specific headers do not exist in HTTP/2; the
            // authority pseudo-header replaces Host.
            if matches!(
                lower.as_str(),
                "connection" | "keep-alive" | "proxy-connection" | "transfer-encoding" | "upgrade" | "host"
            ) {
                continue;
            }
            fields.push((lower, value.to_string()));
        }
        let refs: Vec<(&str, &str)> = fields
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        let mut block = BytesMut::new();
        self.hpack_encoder.encode(&refs, &mut block);
        block.freeze()
    }

    /// HEADERS frame, continued across CONTINUATION frames when the block
    /// exceeds the peer's max frame size.
    fn write_header_block(&mut self, stream_id: u32, block: &[u8], end_stream: bool) {
        let max = self.peer_settings.max_frame_size as usize;
        if block.len() <= max {
            self.writer.write_headers(stream_id, block, end_stream, true);
            return;
        }
        self.writer
            .write_headers(stream_id, &block[..max], end_stream, false);
        let mut rest = &block[max..];
        while rest.len() > max {
            self.writer.write_continuation(stream_id, &rest[..max], false);
            rest = &rest[max..];
        }
        self.writer.write_continuation(stream_id, rest, true);
    }

    /// Write DATA frames for the body, honoring both send windows and the
    /// peer frame size; stalls on zero credit until WINDOW_UPDATE arrives.
    async fn send_body(&mut self, stream_id: u32, body: &[u8]) -> Result<(), HttpError> {
        let mut offset = 0usize;
        while offset < body.len() {
            let (stream_window, closed, reset) = match self.streams.get(&stream_id) {
                Some(s) => (s.send_window, s.is_closed(), s.reset_error),
                None => return Err(HttpError::H2Protocol("stream vanished".into())),
            };
            if let Some(code) = reset {
                return Err(HttpError::H2StreamReset(code));
            }
            if closed {
                return Err(HttpError::H2Protocol("stream closed during send".into()));
            }
            let allowed = stream_window
                .min(self.conn_send_window)
                .min(self.peer_settings.max_frame_size as i64);
            if allowed <= 0 {
                // No credit: read frames until the peer opens the window.
                self.read_and_dispatch().await?;
                continue;
            }
            let end = (offset + allowed as usize).min(body.len());
            let last = end == body.len();
            self.writer.write_data(stream_id, &body[offset..end], last);
            let sent = (end - offset) as i64;
            self.conn_send_window -= sent;
            if let Some(s) = self.streams.get_mut(&stream_id) {
                s.send_window -= sent;
                if last {
                    s.send_end_stream();
                }
            }
            offset = end;
            self.flush_writer().await?;
        }
        Ok(())
    }

    /// One read cycle: pull bytes, dispatch complete frames, apply queued
    /// settings, write queued control frames.
    async fn read_and_dispatch(&mut self) -> Result<(), HttpError> {
        let mut tmp = [0u8; 16_384];
        let n = timeout(self.read_timeout, self.io.read(&mut tmp))
            .await
            .map_err(|_| HttpError::ReadTimeout)?
            .map_err(HttpError::from)?;
        if n == 0 {
            return Err(HttpError::ConnectionReset);
        }
        self.read_buf.extend_from_slice(&tmp[..n]);

        let mut driver = FrameDriver {
            streams: &mut self.streams,
            hpack_decoder: &mut self.hpack_decoder,
            conn_send_window: &mut self.conn_send_window,
            conn_recv_window: &mut self.conn_recv_window,
            peer_settings: &mut self.peer_settings,
            goaway: &mut self.goaway,
            header_block: &mut self.header_block,
            max_body_size: self.max_body_size,
            control: Vec::new(),
            pending_encoder_table_size: None,
            error: None,
        };
        let parse_result = self.parser.receive(&mut self.read_buf, &mut driver);
        let FrameDriver {
            control,
            pending_encoder_table_size,
            error,
            ..
        } = driver;

        if let Err(e) = parse_result {
            // Frame-size violations are connection-fatal.
            self.writer.write_goaway(0, ERROR_FRAME_SIZE_ERROR, b"");
            let _ = self.flush_writer().await;
            return Err(e);
        }
        if let Some(size) = pending_encoder_table_size {
            self.hpack_encoder.set_max_table_size(size as usize);
        }
        for c in control {
            match c {
                Control::SettingsAck => self.writer.write_settings_ack(),
                Control::PingAck(opaque) => self.writer.write_ping(opaque, true),
                Control::WindowUpdate(stream_id, inc) => {
                    self.writer.write_window_update(stream_id, inc)
                }
                Control::Rst(stream_id, code) => self.writer.write_rst_stream(stream_id, code),
            }
        }
        if let Some(e) = error {
            let code = match &e {
                HttpError::H2FlowControl => ERROR_FLOW_CONTROL_ERROR,
                HttpError::CompressionError(_) => ERROR_COMPRESSION_ERROR,
                _ => ERROR_PROTOCOL_ERROR,
            };
            self.writer.write_goaway(0, code, b"");
            let _ = self.flush_writer().await;
            return Err(e);
        }
        self.flush_writer().await?;
        Ok(())
    }

    async fn flush_writer(&mut self) -> Result<(), HttpError> {
        if self.writer.is_empty() {
            return Ok(());
        }
        let buf = self.writer.take_buffer();
        timeout(self.write_timeout, self.io.write_all(&buf))
            .await
            .map_err(|_| HttpError::WriteTimeout)?
            .map_err(HttpError::from)?;
        timeout(self.write_timeout, self.io.flush())
            .await
            .map_err(|_| HttpError::WriteTimeout)?
            .map_err(HttpError::from)?;
        Ok(())
    }

    fn build_response(&self, stream: Stream) -> Result<Response, HttpError> {
        let mut status = None;
        let mut headers = HeaderMap::new();
        for (name, value) in &stream.headers {
            if name == ":status" {
                status = value.parse::<u16>().ok();
            } else if name.starts_with(':') {
                // Unknown response pseudo-header.
                return Err(HttpError::H2Protocol(format!(
                    "unexpected pseudo-header {}",
                    name
                )));
            } else {
                headers.append(name.clone(), value.clone());
            }
        }
        let status = status.ok_or_else(|| HttpError::H2Protocol("missing :status".into()))?;
        let mut response = Response::new(status, Version::H2);
        response.headers = headers;
        response.body = stream.data.freeze();
        Ok(response)
    }
}

/// Per-read-cycle frame handler. Borrows the connection's stream table and
/// decoder; queues control frames and records fatal errors for the
/// connection to act on once the parse pass finishes.
struct FrameDriver<'a> {
    streams: &'a mut HashMap<u32, Stream>,
    hpack_decoder: &'a mut hpack::Decoder,
    conn_send_window: &'a mut i64,
    conn_recv_window: &'a mut i64,
    peer_settings: &'a mut PeerSettings,
    goaway: &'a mut Option<(u32, u32)>,
    header_block: &'a mut Option<(u32, bool, BytesMut)>,
    max_body_size: usize,
    control: Vec<Control>,
    pending_encoder_table_size: Option<u32>,
    error: Option<HttpError>,
}

impl FrameDriver<'_> {
    fn connection_error(&mut self, error: HttpError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Decode a complete header block into the stream's header list.
    fn finish_header_block(&mut self, stream_id: u32, end_stream: bool, block: Bytes) {
        let mut decoded: Vec<(String, String)> = Vec::new();
        let mut cursor = &block[..];
        if let Err(e) = self.hpack_decoder.decode(&mut cursor, &mut decoded) {
            self.connection_error(e);
            return;
        }
        match self.streams.get_mut(&stream_id) {
            Some(stream) => {
                if let Err(e) = stream.recv_headers(end_stream) {
                    self.control.push(Control::Rst(stream_id, ERROR_STREAM_CLOSED));
                    trace!(stream_id, "headers on closed stream: {}", e);
                    return;
                }
                stream.headers.extend(decoded);
            }
            None => {
                self.control.push(Control::Rst(stream_id, ERROR_STREAM_CLOSED));
            }
        }
    }
}

impl H2FrameHandler for FrameDriver<'_> {
    fn data_frame_received(&mut self, stream_id: u32, end_stream: bool, data: Bytes) {
        // Connection window accounting covers every DATA frame received.
        *self.conn_recv_window -= data.len() as i64;
        if *self.conn_recv_window < 0 {
            self.connection_error(HttpError::H2FlowControl);
            return;
        }
        if *self.conn_recv_window < (DEFAULT_INITIAL_WINDOW_SIZE / 2) as i64 {
            let inc = DEFAULT_INITIAL_WINDOW_SIZE as i64 - *self.conn_recv_window;
            self.control.push(Control::WindowUpdate(0, inc as u32));
            *self.conn_recv_window += inc;
        }
        match self.streams.get_mut(&stream_id) {
            Some(stream) if !stream.is_closed() => {
                if stream.debit_recv_window(data.len()).is_err() {
                    self.connection_error(HttpError::H2FlowControl);
                    return;
                }
                if stream.recv_window < (DEFAULT_INITIAL_WINDOW_SIZE / 2) as i64 {
                    let inc = DEFAULT_INITIAL_WINDOW_SIZE as i64 - stream.recv_window;
                    self.control.push(Control::WindowUpdate(stream_id, inc as u32));
                    stream.recv_window += inc;
                }
                if stream.data.len() + data.len() > self.max_body_size {
                    stream.recv_rst(ERROR_CANCEL);
                    stream.body_overflow = true;
                    self.control.push(Control::Rst(stream_id, ERROR_CANCEL));
                    return;
                }
                stream.data.extend_from_slice(&data);
                if end_stream {
                    stream.recv_end_stream();
                }
            }
            _ => {
                self.control.push(Control::Rst(stream_id, ERROR_STREAM_CLOSED));
            }
        }
    }

    fn headers_frame_received(
        &mut self,
        stream_id: u32,
        end_stream: bool,
        end_headers: bool,
        stream_dependency: u32,
        exclusive: bool,
        weight: u8,
        header_block_fragment: Bytes,
    ) {
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.priority.weight = weight as u16;
            stream.priority.dependency = stream_dependency;
            stream.priority.exclusive = exclusive;
        }
        if end_headers {
            self.finish_header_block(stream_id, end_stream, header_block_fragment);
        } else {
            let mut acc = BytesMut::new();
            acc.extend_from_slice(&header_block_fragment);
            *self.header_block = Some((stream_id, end_stream, acc));
        }
    }

    fn priority_frame_received(
        &mut self,
        stream_id: u32,
        stream_dependency: u32,
        exclusive: bool,
        weight: u8,
    ) {
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.priority.weight = weight as u16;
            stream.priority.dependency = stream_dependency;
            stream.priority.exclusive = exclusive;
        }
    }

    fn rst_stream_frame_received(&mut self, stream_id: u32, error_code: u32) {
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.recv_rst(error_code);
            debug!(stream_id, code = error_to_string(error_code), "stream reset by peer");
        }
    }

    fn settings_frame_received(&mut self, ack: bool, settings: Vec<(u16, u32)>) {
        if ack {
            return;
        }
        for (id, value) in settings {
            match id {
                SETTINGS_HEADER_TABLE_SIZE => {
                    self.peer_settings.header_table_size = value;
                    self.pending_encoder_table_size = Some(value);
                }
                SETTINGS_ENABLE_PUSH => match value {
                    0 => self.peer_settings.enable_push = false,
                    1 => self.peer_settings.enable_push = true,
                    _ => {
                        self.connection_error(HttpError::H2Protocol(
                            "SETTINGS_ENABLE_PUSH must be 0 or 1".into(),
                        ));
                        return;
                    }
                },
                SETTINGS_MAX_CONCURRENT_STREAMS => {
                    self.peer_settings.max_concurrent_streams = Some(value);
                }
                SETTINGS_INITIAL_WINDOW_SIZE => {
                    if value as i64 > MAX_WINDOW_SIZE {
                        self.connection_error(HttpError::H2FlowControl);
                        return;
                    }
                    // Applies to streams opened from here on.
                    self.peer_settings.initial_window_size = value;
                }
                SETTINGS_MAX_FRAME_SIZE => {
                    if !(MIN_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&(value as usize)) {
                        self.connection_error(HttpError::H2Protocol(
                            "SETTINGS_MAX_FRAME_SIZE out of range".into(),
                        ));
                        return;
                    }
                    self.peer_settings.max_frame_size = value;
                }
                SETTINGS_MAX_HEADER_LIST_SIZE => {}
                _ => {} // unknown settings are ignored
            }
        }
        self.control.push(Control::SettingsAck);
    }

    fn push_promise_frame_received(
        &mut self,
        _stream_id: u32,
        promised_stream_id: u32,
        _end_headers: bool,
        _header_block_fragment: Bytes,
    ) {
        // We advertise ENABLE_PUSH = 0; a promise is a protocol violation.
        warn!(promised_stream_id, "PUSH_PROMISE received with push disabled");
        self.connection_error(HttpError::H2Protocol(
            "PUSH_PROMISE received with push disabled".into(),
        ));
    }

    fn ping_frame_received(&mut self, ack: bool, opaque_data: u64) {
        if !ack {
            self.control.push(Control::PingAck(opaque_data));
        }
    }

    fn goaway_frame_received(&mut self, last_stream_id: u32, error_code: u32, _debug_data: Bytes) {
        debug!(last_stream_id, code = error_to_string(error_code), "GOAWAY received");
        *self.goaway = Some((last_stream_id, error_code));
        // Streams above the threshold were never processed by the peer.
        for (id, stream) in self.streams.iter_mut() {
            if *id > last_stream_id && !stream.is_closed() {
                stream.recv_rst(ERROR_REFUSED_STREAM);
            }
        }
    }

    fn window_update_frame_received(&mut self, stream_id: u32, window_size_increment: u32) {
        if stream_id == 0 {
            *self.conn_send_window += window_size_increment as i64;
            if *self.conn_send_window > MAX_WINDOW_SIZE {
                self.connection_error(HttpError::H2FlowControl);
            }
        } else if let Some(stream) = self.streams.get_mut(&stream_id) {
            if stream.credit_send_window(window_size_increment).is_err() {
                // Stream-level overflow resets just that stream.
                stream.recv_rst(ERROR_FLOW_CONTROL_ERROR);
                self.control
                    .push(Control::Rst(stream_id, ERROR_FLOW_CONTROL_ERROR));
            }
        }
    }

    fn continuation_frame_received(
        &mut self,
        stream_id: u32,
        end_headers: bool,
        header_block_fragment: Bytes,
    ) {
        match self.header_block.take() {
            Some((expected_id, end_stream, mut acc)) if expected_id == stream_id => {
                acc.extend_from_slice(&header_block_fragment);
                if end_headers {
                    self.finish_header_block(stream_id, end_stream, acc.freeze());
                } else {
                    *self.header_block = Some((stream_id, end_stream, acc));
                }
            }
            other => {
                *self.header_block = other;
                self.connection_error(HttpError::H2Protocol(
                    "CONTINUATION without preceding HEADERS".into(),
                ));
            }
        }
    }

    fn frame_error(&mut self, error_code: u32, stream_id: u32, message: String) {
        if stream_id == 0 {
            self.connection_error(HttpError::H2Protocol(message));
        } else {
            trace!(stream_id, code = error_code, "resetting stream: {}", message);
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.recv_rst(error_code);
            }
            self.control.push(Control::Rst(stream_id, error_code));
        }
    }
}
