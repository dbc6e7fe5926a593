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

//! WebSocket frame format (RFC 6455 §5): push parser handling masked and
//! unmasked frames, encoder with client-side masking.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::HttpError;

// Opcodes
pub const OP_CONTINUATION: u8 = 0x0;
pub const OP_TEXT: u8 = 0x1;
pub const OP_BINARY: u8 = 0x2;
pub const OP_CLOSE: u8 = 0x8;
pub const OP_PING: u8 = 0x9;
pub const OP_PONG: u8 = 0xa;

/// Control opcodes have bit 3 set.
pub fn is_control(opcode: u8) -> bool {
    opcode & 0x8 != 0
}

/// Max payload length accepted for data frames (16 MiB). Control frames
/// are capped at 125 by the RFC.
pub const MAX_FRAME_PAYLOAD: usize = 16 * 1024 * 1024;

/// Callback for completed frames (receive path).
pub trait FrameHandler {
    fn frame(&mut self, opcode: u8, fin: bool, data: &[u8]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Header,
    ExtendedLen2,
    ExtendedLen8,
    MaskKey,
    Payload,
}

/// Push parser for WebSocket frames. Masked payloads are unmasked before
/// dispatch. `require_unmasked` enforces the server-to-client rule.
pub struct FrameParser {
    state: FrameState,
    opcode: u8,
    fin: bool,
    masked: bool,
    mask_key: [u8; 4],
    payload_len: u64,
    /// Reject masked frames (client connections set this).
    require_unmasked: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: FrameState::Header,
            opcode: 0,
            fin: false,
            masked: false,
            mask_key: [0; 4],
            payload_len: 0,
            require_unmasked: false,
        }
    }

    /// A parser for the client role: server frames must not be masked.
    pub fn for_client() -> Self {
        Self {
            require_unmasked: true,
            ..Self::new()
        }
    }

    /// Feed bytes from the stream, dispatching every complete frame.
    pub fn receive<H: FrameHandler>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Result<(), HttpError> {
        loop {
            match self.state {
                FrameState::Header => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    let b0 = buf.get_u8();
                    let b1 = buf.get_u8();
                    self.fin = (b0 & 0x80) != 0;
                    let rsv = b0 & 0x70;
                    if rsv != 0 {
                        return Err(HttpError::InvalidData(
                            "websocket RSV bits set without extension".into(),
                        ));
                    }
                    self.opcode = b0 & 0x0f;
                    self.masked = (b1 & 0x80) != 0;
                    if self.masked && self.require_unmasked {
                        return Err(HttpError::InvalidData(
                            "server frame must not be masked".into(),
                        ));
                    }
                    if is_control(self.opcode) && !self.fin {
                        return Err(HttpError::InvalidData(
                            "fragmented control frame".into(),
                        ));
                    }
                    let len7 = b1 & 0x7f;
                    if is_control(self.opcode) && len7 > 125 {
                        return Err(HttpError::InvalidData(
                            "control frame payload over 125 bytes".into(),
                        ));
                    }
                    if len7 == 126 {
                        self.state = FrameState::ExtendedLen2;
                    } else if len7 == 127 {
                        self.state = FrameState::ExtendedLen8;
                    } else {
                        self.payload_len = len7 as u64;
                        self.state = if self.masked {
                            FrameState::MaskKey
                        } else {
                            FrameState::Payload
                        };
                    }
                }
                FrameState::ExtendedLen2 => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    self.payload_len = buf.get_u16() as u64;
                    self.state = if self.masked {
                        FrameState::MaskKey
                    } else {
                        FrameState::Payload
                    };
                }
                FrameState::ExtendedLen8 => {
                    if buf.len() < 8 {
                        return Ok(());
                    }
                    self.payload_len = buf.get_u64();
                    self.state = if self.masked {
                        FrameState::MaskKey
                    } else {
                        FrameState::Payload
                    };
                }
                FrameState::MaskKey => {
                    if buf.len() < 4 {
                        return Ok(());
                    }
                    buf.copy_to_slice(&mut self.mask_key);
                    self.state = FrameState::Payload;
                }
                FrameState::Payload => {
                    if self.payload_len > MAX_FRAME_PAYLOAD as u64 {
                        return Err(HttpError::InvalidData(
                            "websocket frame payload too long".into(),
                        ));
                    }
                    let need = self.payload_len as usize;
                    if buf.len() < need {
                        return Ok(());
                    }
                    let mut payload = buf.split_to(need);
                    if self.masked {
                        for (i, byte) in payload.iter_mut().enumerate() {
                            *byte ^= self.mask_key[i % 4];
                        }
                    }
                    handler.frame(self.opcode, self.fin, &payload);
                    self.state = FrameState::Header;
                }
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode one frame in the client role: FIN set, payload masked with `key`.
pub fn encode_frame(
    opcode: u8,
    payload: &[u8],
    mask_key: &[u8; 4],
    out: &mut BytesMut,
) -> Result<(), HttpError> {
    if is_control(opcode) && payload.len() > 125 {
        return Err(HttpError::InvalidData(
            "control frame payload over 125 bytes".into(),
        ));
    }
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(HttpError::InvalidData("payload too long".into()));
    }
    out.put_u8(0x80 | (opcode & 0x0f));
    let len = payload.len();
    if len < 126 {
        out.put_u8(0x80 | (len as u8));
    } else if len < 65_536 {
        out.put_u8(0x80 | 126);
        out.put_u16(len as u16);
    } else {
        out.put_u8(0x80 | 127);
        out.put_u64(len as u64);
    }
    out.put_slice(mask_key);
    for (i, &b) in payload.iter().enumerate() {
        out.put_u8(b ^ mask_key[i % 4]);
    }
    Ok(())
}
