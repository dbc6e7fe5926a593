/*
 * encoder.rs
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

//! QPACK encoder (RFC 9204). Field sections open with Required Insert Count 0
//! and Base 0; field lines reference the static table only.

use bytes::BufMut;

use crate::protocol::http::hpack::{encode_integer, encode_string};

use super::static_table;

/// Field section encoder. Holds the advertised dynamic table capacity, which
/// this encoder never actually fills (no encoder stream).
pub struct Encoder {
    max_table_capacity: usize,
}

impl Encoder {
    pub fn new(max_table_capacity: usize) -> Self {
        Self { max_table_capacity }
    }

    /// SETTINGS_QPACK_MAX_TABLE_CAPACITY advertised by the peer.
    pub fn set_max_table_capacity(&mut self, capacity: usize) {
        self.max_table_capacity = capacity;
    }

    pub fn max_table_capacity(&self) -> usize {
        self.max_table_capacity
    }

    /// Encode a field section: prefix (RIC=0, Base=0) then one field line per
    /// header. Names must already be lowercase.
    pub fn encode(&mut self, headers: &[(&str, &str)], out: &mut impl BufMut) {
        out.put_u8(0); // Required Insert Count
        out.put_u8(0); // Base (sign bit 0)
        for &(name, value) in headers {
            encode_field(name, value, out);
        }
    }
}

fn encode_field(name: &str, value: &str, out: &mut impl BufMut) {
    // Indexed field line, static table: 1 1 xxxxxx.
    if let Some(idx) = static_table::find_exact(name, value) {
        encode_integer(idx as u64, 6, 0xc0, out);
        return;
    }
    // Literal with name reference, static table: 0 1 N=0 T=1 xxxx.
    if let Some(idx) = static_table::find_name(name) {
        encode_integer(idx as u64, 4, 0x50, out);
        encode_string(value.as_bytes(), out);
        return;
    }
    // Literal with literal name: 0 0 1 N=0 H=0 xxx.
    encode_integer(name.len() as u64, 3, 0x20, out);
    out.put_slice(name.as_bytes());
    encode_string(value.as_bytes(), out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn section_prefix_is_two_zero_bytes() {
        let mut enc = Encoder::new(0);
        let mut buf = BytesMut::new();
        enc.encode(&[], &mut buf);
        assert_eq!(&buf[..], &[0x00, 0x00]);
    }

    #[test]
    fn static_exact_match() {
        let mut enc = Encoder::new(0);
        let mut buf = BytesMut::new();
        enc.encode(&[(":method", "GET")], &mut buf);
        // 0xc0 | 17 = 0xd1
        assert_eq!(&buf[..], &[0x00, 0x00, 0xd1]);
    }

    #[test]
    fn static_name_reference() {
        let mut enc = Encoder::new(0);
        let mut buf = BytesMut::new();
        enc.encode(&[(":authority", "example.com")], &mut buf);
        // 0x50 | 0 = 0x50, then plain string length 11.
        assert_eq!(buf[2], 0x50);
        assert_eq!(buf[3], 11);
        assert_eq!(&buf[4..15], b"example.com");
    }

    #[test]
    fn literal_name() {
        let mut enc = Encoder::new(0);
        let mut buf = BytesMut::new();
        enc.encode(&[("x-trace", "on")], &mut buf);
        // 0x20 | len 7 = 0x27.
        assert_eq!(buf[2], 0x27);
        assert_eq!(&buf[3..10], b"x-trace");
        assert_eq!(buf[10], 2);
        assert_eq!(&buf[11..13], b"on");
    }
}
