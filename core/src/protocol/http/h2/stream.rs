/*
 * stream.rs
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

//! Per-stream state (RFC 7540 §5.1) and flow-control windows.

use bytes::BytesMut;

use crate::error::HttpError;

use super::frame::MAX_WINDOW_SIZE;

/// Stream states of RFC 7540 §5.1. Reserved states only arise from
/// PUSH_PROMISE, which this client refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// Stream priority as carried on HEADERS/PRIORITY frames.
#[derive(Debug, Clone, Copy)]
pub struct Priority {
    pub weight: u16, // 1..=256
    pub dependency: u32,
    pub exclusive: bool,
}

impl Default for Priority {
    fn default() -> Self {
        Self {
            weight: 16,
            dependency: 0,
            exclusive: false,
        }
    }
}

/// One logical request/response exchange on an HTTP/2 connection.
#[derive(Debug)]
pub struct Stream {
    pub id: u32,
    pub state: StreamState,
    /// Credit for data we may send (peer's receive window for this stream).
    pub send_window: i64,
    /// Credit we have extended to the peer.
    pub recv_window: i64,
    pub priority: Priority,
    /// Decoded response headers (and trailers, appended in order).
    pub headers: Vec<(String, String)>,
    /// Buffered response body.
    pub data: BytesMut,
    /// Error code if the stream was reset by the peer.
    pub reset_error: Option<u32>,
    /// Response body exceeded the configured limit; the stream was canceled.
    pub body_overflow: bool,
}

impl Stream {
    pub fn new(id: u32, initial_send_window: u32, initial_recv_window: u32) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            send_window: initial_send_window as i64,
            recv_window: initial_recv_window as i64,
            priority: Priority::default(),
            headers: Vec::new(),
            data: BytesMut::new(),
            reset_error: None,
            body_overflow: false,
        }
    }

    /// Whether DATA may be sent: open or half-closed-remote with credit.
    pub fn can_send_data(&self) -> bool {
        matches!(self.state, StreamState::Open | StreamState::HalfClosedRemote)
            && self.send_window > 0
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Local endpoint sent HEADERS. END_STREAM moves straight to
    /// half-closed(local).
    pub fn send_headers(&mut self, end_stream: bool) {
        self.state = match (self.state, end_stream) {
            (StreamState::Idle, false) => StreamState::Open,
            (StreamState::Idle, true) => StreamState::HalfClosedLocal,
            (state, _) => state,
        };
    }

    /// Local endpoint sent END_STREAM (on HEADERS or DATA).
    pub fn send_end_stream(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            state => state,
        };
    }

    /// Peer's HEADERS arrived. Returns STREAM_CLOSED when the stream cannot
    /// receive anymore.
    pub fn recv_headers(&mut self, end_stream: bool) -> Result<(), HttpError> {
        match self.state {
            StreamState::Closed | StreamState::HalfClosedRemote => {
                return Err(HttpError::H2Protocol("HEADERS on closed stream".into()));
            }
            StreamState::Idle => {
                self.state = StreamState::Open;
            }
            _ => {}
        }
        if end_stream {
            self.recv_end_stream();
        }
        Ok(())
    }

    /// Peer sent END_STREAM.
    pub fn recv_end_stream(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            state => state,
        };
    }

    /// RST_STREAM in either direction closes immediately.
    pub fn recv_rst(&mut self, error_code: u32) {
        self.reset_error = Some(error_code);
        self.state = StreamState::Closed;
    }

    /// Debit the receive window for a DATA frame we received.
    pub fn debit_recv_window(&mut self, len: usize) -> Result<(), HttpError> {
        self.recv_window -= len as i64;
        if self.recv_window < 0 {
            return Err(HttpError::H2FlowControl);
        }
        Ok(())
    }

    /// Credit the send window from a WINDOW_UPDATE. Overflow past 2^31-1 is
    /// a flow-control error.
    pub fn credit_send_window(&mut self, increment: u32) -> Result<(), HttpError> {
        self.send_window += increment as i64;
        if self.send_window > MAX_WINDOW_SIZE {
            return Err(HttpError::H2FlowControl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_stream() -> Stream {
        Stream::new(1, 65_535, 65_535)
    }

    #[test]
    fn request_response_lifecycle() {
        let mut s = new_stream();
        assert_eq!(s.state, StreamState::Idle);
        s.send_headers(false);
        assert_eq!(s.state, StreamState::Open);
        s.send_end_stream();
        assert_eq!(s.state, StreamState::HalfClosedLocal);
        s.recv_headers(false).unwrap();
        assert_eq!(s.state, StreamState::HalfClosedLocal);
        s.recv_end_stream();
        assert_eq!(s.state, StreamState::Closed);
    }

    #[test]
    fn headers_with_end_stream_skips_open() {
        let mut s = new_stream();
        s.send_headers(true);
        assert_eq!(s.state, StreamState::HalfClosedLocal);
        s.recv_headers(true).unwrap();
        assert_eq!(s.state, StreamState::Closed);
    }

    #[test]
    fn recv_on_closed_is_error() {
        let mut s = new_stream();
        s.send_headers(true);
        s.recv_headers(true).unwrap();
        assert!(s.is_closed());
        assert!(s.recv_headers(false).is_err());
    }

    #[test]
    fn rst_closes_from_any_state() {
        let mut s = new_stream();
        s.send_headers(false);
        s.recv_rst(0x8);
        assert!(s.is_closed());
        assert_eq!(s.reset_error, Some(0x8));
    }

    #[test]
    fn send_gate_requires_state_and_window() {
        let mut s = new_stream();
        s.send_headers(false);
        assert!(s.can_send_data());
        s.send_window = 0;
        assert!(!s.can_send_data());
        s.send_window = 10;
        s.send_end_stream();
        assert!(!s.can_send_data());
    }

    #[test]
    fn window_accounting() {
        let mut s = new_stream();
        s.debit_recv_window(65_535).unwrap();
        assert!(s.debit_recv_window(1).is_err());
        s.send_window = MAX_WINDOW_SIZE - 5;
        assert!(s.credit_send_window(10).is_err());
    }
}
