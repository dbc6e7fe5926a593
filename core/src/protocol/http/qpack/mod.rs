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

//! QPACK field compression for HTTP/3 (RFC 9204), without blocked-stream
//! machinery: every encoded field section carries Required Insert Count 0 and
//! Base 0, so it never references the dynamic table and can always be decoded
//! immediately. Prefix integers and string literals are shared with HPACK.

mod decoder;
mod encoder;
mod static_table;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use static_table::{STATIC_TABLE, STATIC_TABLE_LEN};

pub use crate::protocol::http::hpack::HeaderHandler;
