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

//! HTTP client: HTTP/1.1 engine with pooling/redirects/retries, HTTP/2 frame
//! and stream engine, HTTP/3 framing layer.
//!
//! - Buffers: `bytes` crate (BytesMut for parse buffers, Bytes for payloads).
//! - HTTP/1.1: state-machine push parser driven by the engine read loop.
//! - HTTP/2: our own frame parser + HPACK (no external h2 crate), per-stream
//!   state machine and flow control.
//! - HTTP/3: VarInt/frame codec + QPACK + 0-RTT ticket cache; the QUIC
//!   transport itself is supplied by the caller.
//! - TLS with ALPN `h2`, `http/1.1`; plaintext connections use HTTP/1.1.

pub mod chunked;
pub mod coding;
pub mod request;
pub mod response;

pub mod h1;
pub mod h2;
pub mod h3;
pub mod hpack;
pub mod qpack;

pub mod client;
pub mod connection;
pub mod pool;
pub mod redirect;

pub use client::Client;
pub use connection::{Connection, HttpStream};
pub use request::{Body, Method, MultipartBuilder, Request, RequestBuilder};
pub use response::{Response, Version};
