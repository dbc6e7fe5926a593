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

//! QPACK decoder (RFC 9204). Mirrors the encoder: section prefix, indexed
//! field lines, literals with static name reference, literal names. The
//! dynamic table stays empty without an encoder stream, so dynamic
//! references fail as out of range rather than blocking.

use bytes::Buf;

use crate::error::HttpError;
use crate::protocol::http::hpack::{decode_integer, decode_string, DynamicTable, HeaderHandler};

use super::static_table::{STATIC_TABLE, STATIC_TABLE_LEN};

pub struct Decoder {
    table: DynamicTable,
}

impl Decoder {
    pub fn new(max_table_capacity: usize) -> Self {
        Self {
            table: DynamicTable::new(max_table_capacity),
        }
    }

    pub fn set_max_table_capacity(&mut self, capacity: usize) {
        self.table.set_max_size(capacity);
    }

    /// Decode one encoded field section.
    pub fn decode<B: Buf, H: HeaderHandler>(
        &mut self,
        buf: &mut B,
        handler: &mut H,
    ) -> Result<(), HttpError> {
        // Section prefix: Required Insert Count (8-bit prefix integer), then
        // sign bit + Delta Base (7-bit prefix integer).
        if !buf.has_remaining() {
            return Err(HttpError::UnexpectedEof);
        }
        let ric_byte = buf.get_u8();
        let required_insert_count = decode_integer(buf, ric_byte, 8)?;
        if required_insert_count != 0 {
            return Err(HttpError::UnsupportedFeature(
                "QPACK dynamic table references".into(),
            ));
        }
        if !buf.has_remaining() {
            return Err(HttpError::UnexpectedEof);
        }
        let base_byte = buf.get_u8();
        let _base = decode_integer(buf, base_byte, 7)?;

        while buf.has_remaining() {
            let b = buf.get_u8();
            if (b & 0x80) != 0 {
                // Indexed field line: T bit selects the table.
                let is_static = (b & 0x40) != 0;
                let index = decode_integer(buf, b, 6)? as usize;
                let (name, value) = if is_static {
                    static_entry(index)?
                } else {
                    let (n, v) = self.table.get(index).ok_or_else(|| {
                        HttpError::CompressionError(format!("dynamic index {} out of range", index))
                    })?;
                    (n.to_string(), v.to_string())
                };
                handler.header(&name, &value);
            } else if (b & 0x40) != 0 {
                // Literal with name reference; T bit 0x10 selects the table.
                let is_static = (b & 0x10) != 0;
                let index = decode_integer(buf, b, 4)? as usize;
                let name = if is_static {
                    static_entry(index)?.0
                } else {
                    self.table
                        .get(index)
                        .map(|(n, _)| n.to_string())
                        .ok_or_else(|| {
                            HttpError::CompressionError(format!(
                                "dynamic name index {} out of range",
                                index
                            ))
                        })?
                };
                let value = decode_string(buf)?;
                handler.header(&name, &value);
            } else if (b & 0x20) != 0 {
                // Literal with literal name; H bit 0x08 is Huffman.
                if (b & 0x08) != 0 {
                    return Err(HttpError::CompressionError(
                        "Huffman-coded string not supported".into(),
                    ));
                }
                let name_len = decode_integer(buf, b, 3)? as usize;
                if buf.remaining() < name_len {
                    return Err(HttpError::UnexpectedEof);
                }
                let mut name_bytes = vec![0u8; name_len];
                buf.copy_to_slice(&mut name_bytes);
                let name = String::from_utf8(name_bytes).map_err(|_| {
                    HttpError::CompressionError("field name is not UTF-8".into())
                })?;
                let value = decode_string(buf)?;
                handler.header(&name, &value);
            } else {
                // Post-base forms require dynamic inserts we never make.
                return Err(HttpError::UnsupportedFeature(
                    "QPACK post-base field lines".into(),
                ));
            }
        }
        Ok(())
    }
}

fn static_entry(index: usize) -> Result<(String, String), HttpError> {
    if index >= STATIC_TABLE_LEN {
        return Err(HttpError::CompressionError(format!(
            "static index {} out of range",
            index
        )));
    }
    let (name, value) = STATIC_TABLE[index];
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::qpack::Encoder;
    use bytes::BytesMut;

    fn decode_all(data: &[u8]) -> Result<Vec<(String, String)>, HttpError> {
        let mut decoder = Decoder::new(0);
        let mut out: Vec<(String, String)> = Vec::new();
        let mut cursor = data;
        decoder.decode(&mut cursor, &mut out)?;
        Ok(out)
    }

    #[test]
    fn indexed_static() {
        // Prefix 0,0 then 0xc0|17 = :method GET.
        let decoded = decode_all(&[0x00, 0x00, 0xd1]).unwrap();
        assert_eq!(decoded, vec![(":method".to_string(), "GET".to_string())]);
    }

    #[test]
    fn roundtrip_request_section() {
        let input: &[(&str, &str)] = &[
            (":method", "GET"),
            (":scheme", "https"),
            (":authority", "example.com"),
            (":path", "/index.html"),
            ("accept", "*/*"),
            ("x-request-id", "42"),
        ];
        let mut enc = Encoder::new(0);
        let mut block = BytesMut::new();
        enc.encode(input, &mut block);
        let decoded = decode_all(&block).unwrap();
        let expected: Vec<(String, String)> = input
            .iter()
            .map(|&(n, v)| (n.to_string(), v.to_string()))
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn nonzero_required_insert_count_unsupported() {
        assert!(matches!(
            decode_all(&[0x01, 0x00, 0xd1]),
            Err(HttpError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn dynamic_reference_fails_empty_table() {
        // Indexed field line with T=0 (dynamic), index 0.
        assert!(matches!(
            decode_all(&[0x00, 0x00, 0x80]),
            Err(HttpError::CompressionError(_))
        ));
    }

    #[test]
    fn static_index_out_of_range() {
        // 6-bit prefix saturated: 0xc0|0x3f then continuation 100 -> index 163.
        assert!(decode_all(&[0x00, 0x00, 0xff, 0x64]).is_err());
    }
}
