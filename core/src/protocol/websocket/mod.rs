/*
 * mod.rs
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

//! WebSocket client (RFC 6455): opening handshake over HTTP/1.1, frame
//! codec with client-side masking, connection read loop.

pub mod client;
pub mod connection;
pub mod frame;
pub mod handshake;

pub use client::WebSocketClient;
pub use connection::WebSocketConnection;

/// Callback interface for WebSocket events. The connection's `run` loop
/// answers pings itself; the handler sees them for observability.
pub trait WebSocketHandler {
    fn text_frame(&mut self, data: &[u8]);
    fn binary_frame(&mut self, data: &[u8]);
    fn ping(&mut self, _data: &[u8]) {}
    fn pong(&mut self, _data: &[u8]) {}
    fn close(&mut self, _code: Option<u16>, _reason: &str) {}
    fn failed(&mut self, _error: &crate::error::HttpError) {}
    /// Polled after each frame; return true to leave the read loop.
    fn should_stop(&self) -> bool {
        false
    }
}
