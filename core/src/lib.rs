/*
 * lib.rs
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

//! zhttp core: multi-protocol HTTP client library.
//!
//! - HTTP/1.1 client engine: connection pool, keep-alive, redirects, retries,
//!   chunked transfer, content codings (gzip/deflate/brotli).
//! - HTTP/2: frame codec, HPACK, per-stream state machine, flow control.
//! - HTTP/3: variable-length integers, frame codec, QPACK, 0-RTT session cache
//!   (framing layer only; the QUIC transport is provided by the caller).
//! - WebSocket (RFC 6455) and Server-Sent Events codecs.
//!
//! Buffers use the `bytes` crate; I/O is tokio; TLS is rustls with ALPN
//! (h2 / http/1.1). All wire parsers are push parsers over `BytesMut` that
//! invoke a handler as complete tokens arrive, so they can be tested without
//! any I/O.

pub mod config;
pub mod error;
pub mod headers;
pub mod net;
pub mod url;

pub mod protocol;

pub use config::{ClientConfig, PoolConfig, RedirectPolicy, RetryConfig, TlsConfig, TlsVersion};
pub use error::{ErrorContext, HttpError};
pub use headers::HeaderMap;
pub use url::{Scheme, Url};

pub use protocol::http::client::Client;
pub use protocol::http::request::{Body, Method, MultipartBuilder, Request, RequestBuilder};
pub use protocol::http::response::{Response, Version};
