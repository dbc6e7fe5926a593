/*
 * varint.rs
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

//! QUIC variable-length integers (RFC 9000 §16): the two high bits of the
//! first byte select a 1/2/4/8-byte encoding holding 6/14/30/62-bit values.

use bytes::{Buf, BufMut};

use crate::error::HttpError;

/// Largest encodable value, 2^62 - 1.
pub const MAX_VARINT: u64 = (1 << 62) - 1;

/// Encoded length for a value: 1, 2, 4, or 8 bytes.
pub fn encoded_len(value: u64) -> Result<usize, HttpError> {
    if value < 1 << 6 {
        Ok(1)
    } else if value < 1 << 14 {
        Ok(2)
    } else if value < 1 << 30 {
        Ok(4)
    } else if value <= MAX_VARINT {
        Ok(8)
    } else {
        Err(HttpError::InvalidData(format!("{} exceeds varint range", value)))
    }
}

/// Encode in the shortest form.
pub fn encode(value: u64, out: &mut impl BufMut) -> Result<(), HttpError> {
    match encoded_len(value)? {
        1 => out.put_u8(value as u8),
        2 => out.put_u16((value as u16) | 0x4000),
        4 => out.put_u32((value as u32) | 0x8000_0000),
        _ => out.put_u64(value | 0xc000_0000_0000_0000),
    }
    Ok(())
}

/// Decode one varint. Returns None when the buffer does not yet hold the
/// complete encoding (nothing is consumed in that case).
pub fn decode(buf: &mut impl Buf) -> Result<Option<u64>, HttpError> {
    if !buf.has_remaining() {
        return Ok(None);
    }
    let first = buf.chunk()[0];
    let len = 1usize << (first >> 6);
    if buf.remaining() < len {
        return Ok(None);
    }
    let value = match len {
        1 => buf.get_u8() as u64,
        2 => (buf.get_u16() & 0x3fff) as u64,
        4 => (buf.get_u32() & 0x3fff_ffff) as u64,
        _ => buf.get_u64() & 0x3fff_ffff_ffff_ffff,
    };
    Ok(Some(value))
}
