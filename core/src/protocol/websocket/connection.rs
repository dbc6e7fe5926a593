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

//! WebSocket connection: owns the stream after the handshake, drives the
//! frame parser, answers pings, exposes send helpers.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

use crate::error::HttpError;
use crate::protocol::http::connection::HttpStream;
use crate::protocol::websocket::frame::{
    encode_frame, FrameHandler, FrameParser, OP_BINARY, OP_CLOSE, OP_PING, OP_PONG, OP_TEXT,
};
use crate::protocol::websocket::WebSocketHandler;

/// Established WebSocket connection (client role: every sent frame is
/// masked with a fresh random key).
pub struct WebSocketConnection {
    stream: HttpStream,
    read_buf: BytesMut,
    frame_parser: FrameParser,
}

impl WebSocketConnection {
    pub(crate) fn new(stream: HttpStream, leftover: BytesMut) -> Self {
        Self {
            stream,
            read_buf: leftover,
            frame_parser: FrameParser::for_client(),
        }
    }

    /// Run the read loop, invoking the handler per frame. Pings are
    /// answered automatically. Returns on clean close, handler stop, or
    /// error (after handler.failed).
    pub async fn run(&mut self, handler: &mut dyn WebSocketHandler) -> Result<(), HttpError> {
        loop {
            let mut events = EventQueue::default();
            // Parse whatever is buffered before reading more.
            if let Err(e) = self.frame_parser.receive(&mut self.read_buf, &mut events) {
                handler.failed(&e);
                return Err(e);
            }
            let mut saw_close = false;
            for (opcode, _fin, data) in events.0.drain(..) {
                match opcode {
                    OP_TEXT => handler.text_frame(&data),
                    OP_BINARY => handler.binary_frame(&data),
                    OP_PING => {
                        handler.ping(&data);
                        self.send_pong(&data).await?;
                    }
                    OP_PONG => handler.pong(&data),
                    OP_CLOSE => {
                        let (code, reason) = parse_close_payload(&data);
                        handler.close(code, &reason);
                        saw_close = true;
                    }
                    _ => {}
                }
            }
            if saw_close || handler.should_stop() {
                return Ok(());
            }

            let mut tmp = [0u8; 8192];
            let n = match self.stream.read(&mut tmp).await {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) => {
                    let e = HttpError::from(e);
                    handler.failed(&e);
                    return Err(e);
                }
            };
            self.read_buf.extend_from_slice(&tmp[..n]);
        }
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, data: &str) -> Result<(), HttpError> {
        self.send_frame(OP_TEXT, data.as_bytes()).await
    }

    /// Send a binary frame.
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.send_frame(OP_BINARY, data).await
    }

    pub async fn send_ping(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.send_frame(OP_PING, data).await
    }

    pub async fn send_pong(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.send_frame(OP_PONG, data).await
    }

    /// Send a close frame. Code is optional (1000 = normal closure).
    pub async fn send_close(&mut self, code: Option<u16>, reason: &str) -> Result<(), HttpError> {
        let mut payload = Vec::with_capacity(2 + reason.len());
        if let Some(c) = code {
            payload.extend_from_slice(&c.to_be_bytes());
            payload.extend_from_slice(reason.as_bytes());
        }
        self.send_frame(OP_CLOSE, &payload).await
    }

    async fn send_frame(&mut self, opcode: u8, payload: &[u8]) -> Result<(), HttpError> {
        let mut mask_key = [0u8; 4];
        getrandom::getrandom(&mut mask_key)
            .map_err(|e| HttpError::InvalidData(format!("no entropy for mask: {}", e)))?;
        let mut out = BytesMut::with_capacity(14 + payload.len());
        encode_frame(opcode, payload, &mask_key, &mut out)?;
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        trace!(opcode, len = payload.len(), "frame sent");
        Ok(())
    }
}

/// Close payload: optional 2-byte code followed by a UTF-8 reason.
fn parse_close_payload(data: &[u8]) -> (Option<u16>, String) {
    if data.len() >= 2 {
        let code = u16::from_be_bytes([data[0], data[1]]);
        let reason = String::from_utf8_lossy(&data[2..]).into_owned();
        (Some(code), reason)
    } else {
        (None, String::new())
    }
}

#[derive(Default)]
struct EventQueue(Vec<(u8, bool, Vec<u8>)>);

impl FrameHandler for EventQueue {
    fn frame(&mut self, opcode: u8, fin: bool, data: &[u8]) {
        self.0.push((opcode, fin, data.to_vec()));
    }
}
