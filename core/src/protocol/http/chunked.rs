/*
 * chunked.rs
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

//! Chunked transfer coding (RFC 7230 §4.1). Encoder for the request write
//! path, standalone decoder for buffered bodies. The h1 response parser has
//! its own streaming chunk states and shares nothing with this decoder.

use bytes::{Buf, BytesMut};

use crate::error::HttpError;

/// Append one chunk: HEX-SIZE CRLF DATA CRLF. Empty input is a no-op (a
/// zero-size chunk would terminate the message).
pub fn encode_chunk(data: &[u8], out: &mut Vec<u8>) {
    if data.is_empty() {
        return;
    }
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Append the terminating zero chunk with optional trailer headers.
pub fn encode_final_chunk(trailers: &[(String, String)], out: &mut Vec<u8>) {
    out.extend_from_slice(b"0\r\n");
    for (name, value) in trailers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Data,
    DataCrlf,
    Trailer,
    Done,
}

/// Incremental chunked decoder. Feed bytes with `decode`; `is_done` flips
/// after the zero chunk and its trailer section are consumed.
pub struct ChunkedDecoder {
    state: State,
    chunk_remaining: usize,
    trailers: Vec<(String, String)>,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Size,
            chunk_remaining: 0,
            trailers: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Trailer headers collected after the zero chunk.
    pub fn trailers(&self) -> &[(String, String)] {
        &self.trailers
    }

    /// Consume as much as possible from `buf`, appending decoded payload to
    /// `out`. Partial data stays in `buf` for the next call.
    pub fn decode(&mut self, buf: &mut BytesMut, out: &mut Vec<u8>) -> Result<(), HttpError> {
        loop {
            match self.state {
                State::Size => {
                    let line_end = match find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    let line = buf.split_to(line_end + 2);
                    let line_str = std::str::from_utf8(&line[..line_end]).map_err(|_| {
                        HttpError::ChunkedEncodingError("chunk size line is not ASCII".into())
                    })?;
                    // Extension tokens after ';' are ignored.
                    let hex_part = line_str.split(';').next().unwrap_or("").trim();
                    let size = usize::from_str_radix(hex_part, 16).map_err(|_| {
                        HttpError::ChunkedEncodingError(format!("bad chunk size: {:?}", hex_part))
                    })?;
                    if size == 0 {
                        self.state = State::Trailer;
                    } else {
                        self.chunk_remaining = size;
                        self.state = State::Data;
                    }
                }
                State::Data => {
                    if buf.is_empty() {
                        return Ok(());
                    }
                    let take = self.chunk_remaining.min(buf.len());
                    out.extend_from_slice(&buf.split_to(take));
                    self.chunk_remaining -= take;
                    if self.chunk_remaining == 0 {
                        self.state = State::DataCrlf;
                    }
                }
                State::DataCrlf => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(HttpError::ChunkedEncodingError(
                            "missing CRLF after chunk data".into(),
                        ));
                    }
                    buf.advance(2);
                    self.state = State::Size;
                }
                State::Trailer => {
                    let line_end = match find_crlf(buf) {
                        Some(n) => n,
                        None => return Ok(()),
                    };
                    if line_end == 0 {
                        buf.advance(2);
                        self.state = State::Done;
                        return Ok(());
                    }
                    let line = buf.split_to(line_end + 2);
                    let line_str = std::str::from_utf8(&line[..line_end]).map_err(|_| {
                        HttpError::ChunkedEncodingError("trailer is not ASCII".into())
                    })?;
                    if let Some((name, value)) = line_str.split_once(':') {
                        self.trailers
                            .push((name.trim().to_string(), value.trim().to_string()));
                    }
                }
                State::Done => return Ok(()),
            }
        }
    }

    /// Signal end of input. Errors if the stream ended mid-message.
    pub fn finish(&self) -> Result<(), HttpError> {
        if self.state == State::Done {
            Ok(())
        } else {
            Err(HttpError::ChunkedEncodingError(
                "premature end of chunked stream".into(),
            ))
        }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
