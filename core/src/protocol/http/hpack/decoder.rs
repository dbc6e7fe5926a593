/*
 * decoder.rs
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

//! HPACK decoder (RFC 7541). Decodes header blocks into (name, value) pairs:
//! indexed fields, literals with/without indexing, never-indexed literals,
//! and dynamic table size updates.

use bytes::Buf;

use crate::error::HttpError;

use super::static_table::{STATIC_TABLE, STATIC_TABLE_SIZE};
use super::{decode_integer, decode_string, DynamicTable};

/// Callback for each decoded header.
pub trait HeaderHandler {
    fn header(&mut self, name: &str, value: &str);
}

impl HeaderHandler for Vec<(String, String)> {
    fn header(&mut self, name: &str, value: &str) {
        self.push((name.to_string(), value.to_string()));
    }
}

/// Connection-scoped header block decoder.
pub struct Decoder {
    /// Ceiling from SETTINGS_HEADER_TABLE_SIZE; size updates above it are
    /// a compression error.
    header_table_size: usize,
    table: DynamicTable,
}

impl Decoder {
    pub fn new(header_table_size: usize) -> Self {
        Self {
            header_table_size,
            table: DynamicTable::new(header_table_size),
        }
    }

    /// Apply SETTINGS_HEADER_TABLE_SIZE.
    pub fn set_max_table_size(&mut self, size: usize) {
        self.header_table_size = size;
        if self.table.max_size() > size {
            self.table.set_max_size(size);
        }
    }

    /// Decode a complete header block, invoking the handler per header.
    pub fn decode<B: Buf, H: HeaderHandler>(
        &mut self,
        buf: &mut B,
        handler: &mut H,
    ) -> Result<(), HttpError> {
        while buf.has_remaining() {
            let b = buf.get_u8();
            if (b & 0x80) != 0 {
                // Indexed header field (7-bit index).
                let index = decode_integer(buf, b, 7)?;
                if index == 0 {
                    return Err(HttpError::CompressionError("indexed field with index 0".into()));
                }
                let (name, value) = self.get_indexed(index)?;
                handler.header(&name, &value);
            } else if (b & 0x40) != 0 {
                // Literal with incremental indexing (6-bit name index).
                let (name, value) = self.get_literal(buf, b, 6)?;
                self.table.insert(name.clone(), value.clone());
                handler.header(&name, &value);
            } else if (b & 0x20) != 0 {
                // Dynamic table size update (5-bit).
                let max_size = decode_integer(buf, b, 5)? as usize;
                if max_size > self.header_table_size {
                    return Err(HttpError::CompressionError(
                        "table size update exceeds SETTINGS limit".into(),
                    ));
                }
                self.table.set_max_size(max_size);
            } else {
                // Literal without indexing (0000) or never indexed (0001);
                // both use a 4-bit name index and skip the table.
                let (name, value) = self.get_literal(buf, b, 4)?;
                handler.header(&name, &value);
            }
        }
        Ok(())
    }

    fn get_indexed(&self, index: u64) -> Result<(String, String), HttpError> {
        if index < STATIC_TABLE_SIZE as u64 {
            let (name, value) = STATIC_TABLE[index as usize];
            Ok((name.to_string(), value.unwrap_or("").to_string()))
        } else {
            let dyn_index = (index - STATIC_TABLE_SIZE as u64) as usize;
            match self.table.get(dyn_index) {
                Some((n, v)) => Ok((n.to_string(), v.to_string())),
                None => Err(HttpError::CompressionError(format!(
                    "index {} out of range",
                    index
                ))),
            }
        }
    }

    fn get_literal<B: Buf>(
        &self,
        buf: &mut B,
        opcode: u8,
        nbits: u8,
    ) -> Result<(String, String), HttpError> {
        let index = decode_integer(buf, opcode, nbits)?;
        let name = if index == 0 {
            decode_string(buf)?
        } else {
            self.get_indexed(index)?.0
        };
        let value = decode_string(buf)?;
        Ok((name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::hpack::Encoder;
    use bytes::BytesMut;

    fn decode_all(decoder: &mut Decoder, data: &[u8]) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        let mut cursor = data;
        decoder.decode(&mut cursor, &mut out).unwrap();
        out
    }

    #[test]
    fn indexed_static_fields() {
        // 0x82 = :method GET, 0x87 = :scheme https, 0x84 = :path /
        let mut decoder = Decoder::new(4096);
        let decoded = decode_all(&mut decoder, &[0x82, 0x87, 0x84]);
        assert_eq!(
            decoded,
            vec![
                (":method".to_string(), "GET".to_string()),
                (":scheme".to_string(), "https".to_string()),
                (":path".to_string(), "/".to_string()),
            ]
        );
    }

    #[test]
    fn literal_without_indexing_new_name() {
        let data: &[u8] = &[
            0x00, // literal without indexing, new name
            0x03, b'f', b'o', b'o',
            0x03, b'b', b'a', b'r',
        ];
        let mut decoder = Decoder::new(4096);
        assert_eq!(decode_all(&mut decoder, data), vec![("foo".to_string(), "bar".to_string())]);
    }

    #[test]
    fn never_indexed_literal() {
        let data: &[u8] = &[
            0x10, // never indexed, new name
            0x01, b'x',
            0x01, b'y',
        ];
        let mut decoder = Decoder::new(4096);
        assert_eq!(decode_all(&mut decoder, data), vec![("x".to_string(), "y".to_string())]);
    }

    #[test]
    fn literal_with_indexing_populates_table() {
        let data: &[u8] = &[
            0x40,
            0x04, b't', b'e', b's', b't',
            0x05, b'v', b'a', b'l', b'u', b'e',
        ];
        let mut decoder = Decoder::new(4096);
        assert_eq!(
            decode_all(&mut decoder, data),
            vec![("test".to_string(), "value".to_string())]
        );
        // 62 now resolves to the inserted entry.
        assert_eq!(
            decode_all(&mut decoder, &[0x80 | 62]),
            vec![("test".to_string(), "value".to_string())]
        );
    }

    #[test]
    fn index_zero_is_error() {
        let mut decoder = Decoder::new(4096);
        let mut out: Vec<(String, String)> = Vec::new();
        assert!(decoder.decode(&mut &[0x80u8][..], &mut out).is_err());
    }

    #[test]
    fn out_of_range_index_is_error() {
        let mut decoder = Decoder::new(4096);
        let mut out: Vec<(String, String)> = Vec::new();
        assert!(decoder.decode(&mut &[0x80 | 70u8][..], &mut out).is_err());
    }

    #[test]
    fn size_update_respects_settings_ceiling() {
        let mut decoder = Decoder::new(100);
        let mut out: Vec<(String, String)> = Vec::new();
        // Update to 32 is fine.
        decoder.decode(&mut &[0x20 | 0x1f, 0x01][..], &mut out).unwrap();
        // 0x3f 0xe1 0x01 = update to 256 > 100.
        assert!(decoder.decode(&mut &[0x3f, 0xe1, 0x01][..], &mut out).is_err());
    }

    #[test]
    fn roundtrip_request_headers() {
        let input: &[(&str, &str)] = &[
            (":method", "GET"),
            (":path", "/resource"),
            (":scheme", "https"),
            (":authority", "www.example.com"),
            ("accept", "text/html"),
            ("user-agent", "zhttp/0.1.0"),
            ("x-custom", "12345"),
        ];
        let mut encoder = Encoder::new(4096);
        let mut block = BytesMut::new();
        encoder.encode(input, &mut block);

        let mut decoder = Decoder::new(4096);
        let decoded = decode_all(&mut decoder, &block);
        let expected: Vec<(String, String)> = input
            .iter()
            .map(|&(n, v)| (n.to_string(), v.to_string()))
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn roundtrip_preserves_dynamic_state_across_blocks() {
        let mut encoder = Encoder::new(4096);
        let mut decoder = Decoder::new(4096);
        for _ in 0..3 {
            let mut block = BytesMut::new();
            encoder.encode(&[("x-session", "deadbeef"), ("accept", "*/*")], &mut block);
            let decoded = decode_all(&mut decoder, &block);
            assert_eq!(
                decoded,
                vec![
                    ("x-session".to_string(), "deadbeef".to_string()),
                    ("accept".to_string(), "*/*".to_string()),
                ]
            );
        }
    }
}
