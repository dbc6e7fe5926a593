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

//! HPACK encoder (RFC 7541). Indexed fields for table hits, literal with
//! incremental indexing otherwise; the dynamic table mirrors the decoder's.

use bytes::BufMut;

use super::static_table::{self, STATIC_TABLE_SIZE};
use super::{encode_integer, encode_string, DynamicTable};

/// Connection-scoped header block encoder.
pub struct Encoder {
    table: DynamicTable,
    /// A pending size change is announced at the start of the next block.
    pending_size_update: Option<usize>,
}

impl Encoder {
    pub fn new(max_table_size: usize) -> Self {
        Self {
            table: DynamicTable::new(max_table_size),
            pending_size_update: None,
        }
    }

    /// Apply SETTINGS_HEADER_TABLE_SIZE. The update instruction is emitted
    /// in the next encoded block.
    pub fn set_max_table_size(&mut self, size: usize) {
        self.table.set_max_size(size);
        self.pending_size_update = Some(size);
    }

    /// Encode a header block. Names must already be lowercase; pseudo-headers
    /// come first in the slice.
    pub fn encode(&mut self, headers: &[(&str, &str)], out: &mut impl BufMut) {
        if let Some(size) = self.pending_size_update.take() {
            encode_integer(size as u64, 5, 0x20, out);
        }
        for &(name, value) in headers {
            self.encode_field(name, value, out);
        }
    }

    fn encode_field(&mut self, name: &str, value: &str, out: &mut impl BufMut) {
        // Indexed header field (§6.1): exact static or dynamic match.
        if let Some(idx) = static_table::find_exact(name, value) {
            encode_integer(idx as u64, 7, 0x80, out);
            return;
        }
        if let Some(idx) = self.table.find_exact(name, value) {
            encode_integer((STATIC_TABLE_SIZE + idx) as u64, 7, 0x80, out);
            return;
        }
        // Literal with incremental indexing (§6.2.1), indexed or new name.
        let name_index = static_table::find_name(name)
            .or_else(|| self.table.find_name(name).map(|i| STATIC_TABLE_SIZE + i));
        match name_index {
            Some(idx) => {
                encode_integer(idx as u64, 6, 0x40, out);
            }
            None => {
                out.put_u8(0x40);
                encode_string(name.as_bytes(), out);
            }
        }
        encode_string(value.as_bytes(), out);
        self.table.insert(name.to_string(), value.to_string());
    }

    #[cfg(test)]
    pub(crate) fn table_len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn static_exact_match_is_one_byte() {
        let mut enc = Encoder::new(4096);
        let mut buf = BytesMut::new();
        enc.encode(&[(":method", "GET")], &mut buf);
        assert_eq!(&buf[..], &[0x82]);

        let mut buf = BytesMut::new();
        enc.encode(&[(":method", "POST")], &mut buf);
        assert_eq!(&buf[..], &[0x83]);

        let mut buf = BytesMut::new();
        enc.encode(&[(":scheme", "https")], &mut buf);
        assert_eq!(&buf[..], &[0x87]);

        let mut buf = BytesMut::new();
        enc.encode(&[(":path", "/")], &mut buf);
        assert_eq!(&buf[..], &[0x84]);
    }

    #[test]
    fn name_match_uses_indexed_name_literal() {
        let mut enc = Encoder::new(4096);
        let mut buf = BytesMut::new();
        enc.encode(&[(":authority", "example.com")], &mut buf);
        // 0x41 = literal with incremental indexing, name index 1.
        assert_eq!(buf[0], 0x41);
        assert_eq!(buf[1], 11); // plain string, length 11
        assert_eq!(&buf[2..13], b"example.com");
        assert_eq!(enc.table_len(), 1);
    }

    #[test]
    fn new_name_literal() {
        let mut enc = Encoder::new(4096);
        let mut buf = BytesMut::new();
        enc.encode(&[("x-custom", "yes")], &mut buf);
        assert_eq!(buf[0], 0x40);
        assert_eq!(buf[1], 8);
        assert_eq!(&buf[2..10], b"x-custom");
        assert_eq!(buf[10], 3);
        assert_eq!(&buf[11..14], b"yes");
    }

    #[test]
    fn repeated_header_hits_dynamic_table() {
        let mut enc = Encoder::new(4096);
        let mut first = BytesMut::new();
        enc.encode(&[("x-token", "abc123")], &mut first);
        let mut second = BytesMut::new();
        enc.encode(&[("x-token", "abc123")], &mut second);
        // Second occurrence is a single indexed byte: 62 = first dynamic slot.
        assert_eq!(&second[..], &[0x80 | 62]);
    }

    #[test]
    fn size_update_emitted_once() {
        let mut enc = Encoder::new(4096);
        enc.set_max_table_size(256);
        let mut buf = BytesMut::new();
        enc.encode(&[(":method", "GET")], &mut buf);
        // 0x20 prefix, value 256 => 0x3f 0xe1 0x01
        assert_eq!(&buf[..3], &[0x3f, 0xe1, 0x01]);
        assert_eq!(buf[3], 0x82);
        let mut buf2 = BytesMut::new();
        enc.encode(&[(":method", "GET")], &mut buf2);
        assert_eq!(&buf2[..], &[0x82]);
    }
}
