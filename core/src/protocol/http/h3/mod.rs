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

//! HTTP/3 framing layer (RFC 9114): variable-length integers, the frame
//! codec, and the 0-RTT session-ticket cache. The QUIC transport itself is
//! an external collaborator providing streams and ALPN `h3`.

pub mod frame;
pub mod varint;
pub mod zero_rtt;

pub use frame::{H3Frame, H3FrameParser};
pub use zero_rtt::{SessionTicket, ZeroRttCache};
