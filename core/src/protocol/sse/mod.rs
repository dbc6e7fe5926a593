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

//! Server-Sent Events parser (WHATWG HTML, text/event-stream). Line
//! oriented; CR, LF, and CRLF all terminate lines. A blank line dispatches
//! the accumulated event.

use bytes::{Buf, BytesMut};

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// The `event` field; receivers treat None as "message".
    pub event_type: Option<String>,
    pub id: Option<String>,
    /// The `retry` field in milliseconds, when a valid integer was seen.
    pub retry: Option<u64>,
    /// `data` lines joined with newlines.
    pub data: String,
}

/// Callback for parsed stream items.
pub trait SseHandler {
    fn event(&mut self, event: SseEvent);
    fn comment(&mut self, _text: &str) {}
}

/// Push parser. Feed raw body bytes with `receive`; call `eof` at stream
/// end (an unterminated trailing event is discarded, per the spec).
pub struct SseParser {
    line: Vec<u8>,
    /// A bare CR at a chunk boundary may be half of a CRLF.
    pending_cr: bool,
    /// Strip a UTF-8 BOM at the very start of the stream.
    at_start: bool,
    event_type: Option<String>,
    id: Option<String>,
    retry: Option<u64>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            line: Vec::new(),
            pending_cr: false,
            at_start: true,
            event_type: None,
            id: None,
            retry: None,
            data_lines: Vec::new(),
        }
    }

    /// Consume a chunk of the event stream.
    pub fn receive<H: SseHandler>(&mut self, buf: &mut BytesMut, handler: &mut H) {
        while buf.has_remaining() {
            let b = buf.get_u8();
            if self.pending_cr {
                self.pending_cr = false;
                self.finish_line(handler);
                if b == b'\n' {
                    continue; // CRLF
                }
            }
            match b {
                b'\r' => self.pending_cr = true,
                b'\n' => self.finish_line(handler),
                other => self.line.push(other),
            }
        }
    }

    /// Signal end of stream. A pending CR still terminates its line, but an
    /// event without a trailing blank line is not dispatched.
    pub fn eof<H: SseHandler>(&mut self, handler: &mut H) {
        if self.pending_cr {
            self.pending_cr = false;
            self.finish_line(handler);
        }
    }

    fn finish_line<H: SseHandler>(&mut self, handler: &mut H) {
        let mut line = std::mem::take(&mut self.line);
        if self.at_start {
            self.at_start = false;
            if line.starts_with(&[0xef, 0xbb, 0xbf]) {
                line.drain(..3);
            }
        }
        let line = String::from_utf8_lossy(&line).into_owned();
        if line.is_empty() {
            self.dispatch(handler);
            return;
        }
        if let Some(comment) = line.strip_prefix(':') {
            handler.comment(comment);
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line.as_str(), ""),
        };
        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            "id" => {
                // An id containing NUL is ignored.
                if !value.contains('\0') {
                    self.id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(ms);
                }
            }
            _ => {} // unknown fields are ignored
        }
    }

    fn dispatch<H: SseHandler>(&mut self, handler: &mut H) {
        if self.data_lines.is_empty() {
            // Without data there is nothing to dispatch; the type resets.
            self.event_type = None;
            return;
        }
        let event = SseEvent {
            event_type: self.event_type.take(),
            id: self.id.clone(),
            retry: self.retry,
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        handler.event(event);
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}
