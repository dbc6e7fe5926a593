/*
 * frame.rs
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

//! HTTP/3 frame codec (RFC 9114 §7): each frame is VARINT type, VARINT
//! length, payload. Unknown frame types are silently discarded.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::HttpError;

use super::varint;

// Frame types
pub const FRAME_DATA: u64 = 0x0;
pub const FRAME_HEADERS: u64 = 0x1;
pub const FRAME_CANCEL_PUSH: u64 = 0x3;
pub const FRAME_SETTINGS: u64 = 0x4;
pub const FRAME_PUSH_PROMISE: u64 = 0x5;
pub const FRAME_GOAWAY: u64 = 0x7;
pub const FRAME_MAX_PUSH_ID: u64 = 0xd;

// SETTINGS identifiers carried on the control stream.
pub const SETTINGS_QPACK_MAX_TABLE_CAPACITY: u64 = 0x1;
pub const SETTINGS_MAX_FIELD_SECTION_SIZE: u64 = 0x6;
pub const SETTINGS_QPACK_BLOCKED_STREAMS: u64 = 0x7;

/// A parsed HTTP/3 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum H3Frame {
    Data(Bytes),
    Headers(Bytes),
    CancelPush(u64),
    Settings(Vec<(u64, u64)>),
    PushPromise { push_id: u64, header_block: Bytes },
    Goaway(u64),
    MaxPushId(u64),
}

impl H3Frame {
    fn frame_type(&self) -> u64 {
        match self {
            H3Frame::Data(_) => FRAME_DATA,
            H3Frame::Headers(_) => FRAME_HEADERS,
            H3Frame::CancelPush(_) => FRAME_CANCEL_PUSH,
            H3Frame::Settings(_) => FRAME_SETTINGS,
            H3Frame::PushPromise { .. } => FRAME_PUSH_PROMISE,
            H3Frame::Goaway(_) => FRAME_GOAWAY,
            H3Frame::MaxPushId(_) => FRAME_MAX_PUSH_ID,
        }
    }

    /// Serialize: VARINT type, VARINT length, payload.
    pub fn encode(&self, out: &mut BytesMut) -> Result<(), HttpError> {
        let mut payload = BytesMut::new();
        match self {
            H3Frame::Data(data) | H3Frame::Headers(data) => {
                payload.extend_from_slice(data);
            }
            H3Frame::CancelPush(id) | H3Frame::Goaway(id) | H3Frame::MaxPushId(id) => {
                varint::encode(*id, &mut payload)?;
            }
            H3Frame::Settings(pairs) => {
                for (id, value) in pairs {
                    varint::encode(*id, &mut payload)?;
                    varint::encode(*value, &mut payload)?;
                }
            }
            H3Frame::PushPromise { push_id, header_block } => {
                varint::encode(*push_id, &mut payload)?;
                payload.extend_from_slice(header_block);
            }
        }
        varint::encode(self.frame_type(), out)?;
        varint::encode(payload.len() as u64, out)?;
        out.extend_from_slice(&payload);
        Ok(())
    }
}

/// Pull parser for HTTP/3 frames. `decode` yields one frame per call once
/// its bytes are complete; unknown types are skipped transparently.
pub struct H3FrameParser;

impl H3FrameParser {
    /// Decode the next known frame from the buffer. Returns Ok(None) when
    /// more bytes are needed; the buffer is only advanced past complete
    /// frames.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<H3Frame>, HttpError> {
        loop {
            let (frame_type, length, header_len) = {
                let mut peek = &buf[..];
                let frame_type = match varint::decode(&mut peek)? {
                    Some(t) => t,
                    None => return Ok(None),
                };
                let length = match varint::decode(&mut peek)? {
                    Some(l) => l,
                    None => return Ok(None),
                };
                (frame_type, length as usize, buf.len() - peek.remaining())
            };
            if buf.len() < header_len + length {
                return Ok(None);
            }
            buf.advance(header_len);
            let payload = buf.split_to(length).freeze();
            match parse_payload(frame_type, payload)? {
                Some(frame) => return Ok(Some(frame)),
                None => continue, // unknown type: discard and keep reading
            }
        }
    }
}

fn parse_payload(frame_type: u64, payload: Bytes) -> Result<Option<H3Frame>, HttpError> {
    let frame = match frame_type {
        FRAME_DATA => H3Frame::Data(payload),
        FRAME_HEADERS => H3Frame::Headers(payload),
        FRAME_CANCEL_PUSH => H3Frame::CancelPush(whole_varint(payload, "CANCEL_PUSH")?),
        FRAME_GOAWAY => H3Frame::Goaway(whole_varint(payload, "GOAWAY")?),
        FRAME_MAX_PUSH_ID => H3Frame::MaxPushId(whole_varint(payload, "MAX_PUSH_ID")?),
        FRAME_SETTINGS => {
            let mut pairs = Vec::new();
            let mut cursor = &payload[..];
            while cursor.has_remaining() {
                let id = varint::decode(&mut cursor)?
                    .ok_or_else(|| HttpError::H3Stream("truncated SETTINGS".into()))?;
                let value = varint::decode(&mut cursor)?
                    .ok_or_else(|| HttpError::H3Stream("truncated SETTINGS".into()))?;
                pairs.push((id, value));
            }
            H3Frame::Settings(pairs)
        }
        FRAME_PUSH_PROMISE => {
            let mut cursor = &payload[..];
            let push_id = varint::decode(&mut cursor)?
                .ok_or_else(|| HttpError::H3Stream("truncated PUSH_PROMISE".into()))?;
            let header_block = payload.slice(payload.len() - cursor.remaining()..);
            H3Frame::PushPromise { push_id, header_block }
        }
        _ => return Ok(None),
    };
    Ok(Some(frame))
}

fn whole_varint(payload: Bytes, what: &str) -> Result<u64, HttpError> {
    let mut cursor = &payload[..];
    let value = varint::decode(&mut cursor)?
        .ok_or_else(|| HttpError::H3Stream(format!("truncated {}", what)))?;
    if cursor.has_remaining() {
        return Err(HttpError::H3Stream(format!("trailing bytes in {}", what)));
    }
    Ok(value)
}
