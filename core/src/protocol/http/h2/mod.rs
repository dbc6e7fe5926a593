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

//! HTTP/2 (RFC 7540): frame codec, stream state machine, flow control, and
//! the client connection engine multiplexing requests over one transport.

pub mod connection;
pub mod frame;
pub mod handler;
pub mod parser;
pub mod stream;
pub mod writer;

pub use connection::H2Connection;
pub use frame::FrameHeader;
pub use handler::H2FrameHandler;
pub use parser::H2Parser;
pub use stream::{Stream, StreamState};
pub use writer::H2Writer;
