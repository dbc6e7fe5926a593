/*
 * coding.rs
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

//! Content codings: identity, gzip, deflate (flate2), brotli. The brotli
//! codec covers uncompressed meta-blocks only (RFC 7932 header + raw data);
//! decoding a compressed meta-block reports CompressedBrotliNotImplemented.

use std::io::Read;

use flate2::read::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use flate2::Compression;

use crate::error::HttpError;

/// A supported Content-Encoding algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
}

impl Coding {
    /// Map a Content-Encoding token. Unknown tokens return None; the caller
    /// passes the body through untouched.
    pub fn from_token(token: &str) -> Option<Coding> {
        let token = token.trim();
        if token.eq_ignore_ascii_case("identity") || token.is_empty() {
            Some(Coding::Identity)
        } else if token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip") {
            Some(Coding::Gzip)
        } else if token.eq_ignore_ascii_case("deflate") {
            Some(Coding::Deflate)
        } else if token.eq_ignore_ascii_case("br") {
            Some(Coding::Brotli)
        } else {
            None
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Coding::Identity => "identity",
            Coding::Gzip => "gzip",
            Coding::Deflate => "deflate",
            Coding::Brotli => "br",
        }
    }
}

pub fn compress(coding: Coding, data: &[u8]) -> Result<Vec<u8>, HttpError> {
    match coding {
        Coding::Identity => Ok(data.to_vec()),
        Coding::Gzip => {
            let mut out = Vec::new();
            GzEncoder::new(data, Compression::default())
                .read_to_end(&mut out)
                .map_err(|e| HttpError::CompressionError(e.to_string()))?;
            Ok(out)
        }
        Coding::Deflate => {
            let mut out = Vec::new();
            ZlibEncoder::new(data, Compression::default())
                .read_to_end(&mut out)
                .map_err(|e| HttpError::CompressionError(e.to_string()))?;
            Ok(out)
        }
        Coding::Brotli => Ok(brotli::encode_uncompressed(data)),
    }
}

pub fn decompress(coding: Coding, data: &[u8]) -> Result<Vec<u8>, HttpError> {
    match coding {
        Coding::Identity => Ok(data.to_vec()),
        Coding::Gzip => {
            let mut out = Vec::new();
            GzDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| HttpError::CompressionError(e.to_string()))?;
            Ok(out)
        }
        Coding::Deflate => {
            let mut out = Vec::new();
            ZlibDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| HttpError::CompressionError(e.to_string()))?;
            Ok(out)
        }
        Coding::Brotli => brotli::decode(data),
    }
}

mod brotli {
    //! RFC 7932 subset: streams consisting of uncompressed meta-blocks.
    //! Bits are read and written LSB-first within each byte.

    use crate::error::HttpError;

    /// Largest MLEN expressible with 6 nibbles.
    const MAX_META_BLOCK: usize = 1 << 24;

    struct BitWriter {
        out: Vec<u8>,
        bit: u32,
        cur: u8,
    }

    impl BitWriter {
        fn new() -> Self {
            Self { out: Vec::new(), bit: 0, cur: 0 }
        }

        fn write_bits(&mut self, mut value: u64, mut count: u32) {
            while count > 0 {
                if value & 1 != 0 {
                    self.cur |= 1 << self.bit;
                }
                value >>= 1;
                count -= 1;
                self.bit += 1;
                if self.bit == 8 {
                    self.out.push(self.cur);
                    self.cur = 0;
                    self.bit = 0;
                }
            }
        }

        /// Pad the current byte with zero bits.
        fn align(&mut self) {
            if self.bit != 0 {
                self.out.push(self.cur);
                self.cur = 0;
                self.bit = 0;
            }
        }

        fn finish(mut self) -> Vec<u8> {
            self.align();
            self.out
        }
    }

    struct BitReader<'a> {
        data: &'a [u8],
        pos: usize,
        bit: u32,
    }

    impl<'a> BitReader<'a> {
        fn new(data: &'a [u8]) -> Self {
            Self { data, pos: 0, bit: 0 }
        }

        fn read_bits(&mut self, count: u32) -> Result<u64, HttpError> {
            let mut value = 0u64;
            for i in 0..count {
                if self.pos >= self.data.len() {
                    return Err(HttpError::UnexpectedEof);
                }
                let bit = (self.data[self.pos] >> self.bit) & 1;
                value |= (bit as u64) << i;
                self.bit += 1;
                if self.bit == 8 {
                    self.bit = 0;
                    self.pos += 1;
                }
            }
            Ok(value)
        }

        fn align(&mut self) {
            if self.bit != 0 {
                self.bit = 0;
                self.pos += 1;
            }
        }

        fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], HttpError> {
            debug_assert_eq!(self.bit, 0);
            if self.pos + count > self.data.len() {
                return Err(HttpError::UnexpectedEof);
            }
            let slice = &self.data[self.pos..self.pos + count];
            self.pos += count;
            Ok(slice)
        }
    }

    /// Encode `data` as uncompressed meta-blocks: WBITS=16 header, one
    /// ISUNCOMPRESSED block per 16 MiB, terminated by an empty last block.
    pub fn encode_uncompressed(data: &[u8]) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 1); // WBITS = 16
        for chunk in data.chunks(MAX_META_BLOCK) {
            bw.write_bits(0, 1); // ISLAST = 0
            let mlen = chunk.len() as u64 - 1;
            let nibbles: u32 = if mlen < 1 << 16 {
                4
            } else if mlen < 1 << 20 {
                5
            } else {
                6
            };
            bw.write_bits((nibbles - 4) as u64, 2);
            bw.write_bits(mlen, nibbles * 4);
            bw.write_bits(1, 1); // ISUNCOMPRESSED
            bw.align();
            bw.out.extend_from_slice(chunk);
        }
        bw.write_bits(1, 1); // ISLAST
        bw.write_bits(1, 1); // ISLASTEMPTY
        bw.finish()
    }

    /// Decode a stream of uncompressed meta-blocks. Compressed or metadata
    /// meta-blocks are reported, not decoded.
    pub fn decode(data: &[u8]) -> Result<Vec<u8>, HttpError> {
        let mut br = BitReader::new(data);
        read_wbits(&mut br)?;
        let mut out = Vec::new();
        loop {
            let is_last = br.read_bits(1)? == 1;
            if is_last && br.read_bits(1)? == 1 {
                return Ok(out);
            }
            let nibble_code = br.read_bits(2)?;
            if nibble_code == 3 {
                // Metadata meta-block; carries entropy-coded skip fields.
                return Err(HttpError::CompressedBrotliNotImplemented);
            }
            let nibbles = 4 + nibble_code as u32;
            let mlen = br.read_bits(nibbles * 4)? as usize + 1;
            if is_last {
                // A last non-empty meta-block is always compressed.
                return Err(HttpError::CompressedBrotliNotImplemented);
            }
            if br.read_bits(1)? != 1 {
                return Err(HttpError::CompressedBrotliNotImplemented);
            }
            br.align();
            out.extend_from_slice(br.read_bytes(mlen)?);
        }
    }

    /// WBITS code per RFC 7932 §9.1. The window size itself is irrelevant
    /// for uncompressed blocks; only consuming the right bits matters.
    fn read_wbits(br: &mut BitReader) -> Result<(), HttpError> {
        if br.read_bits(1)? == 0 {
            return Ok(()); // WBITS = 16
        }
        let n = br.read_bits(3)?;
        if n != 0 {
            return Ok(()); // WBITS = 17..24
        }
        let m = br.read_bits(3)?;
        if m == 1 {
            return Err(HttpError::InvalidData("invalid brotli window bits".into()));
        }
        Ok(())
    }

}
