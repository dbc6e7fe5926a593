/*
 * error.rs
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

//! Client and protocol errors.

use std::fmt;
use std::io;

/// Extra information attached to a user-visible failure.
#[derive(Debug, Default)]
pub struct ErrorContext {
    pub message: Option<String>,
    pub url: Option<String>,
    pub status_code: Option<u16>,
    pub system_code: Option<i32>,
}

/// Errors from the client engine, codecs, and protocol state machines.
#[derive(Debug)]
pub enum HttpError {
    // Timeouts (each deadline is tracked independently).
    ConnectTimeout,
    ReadTimeout,
    WriteTimeout,
    TotalTimeout,

    // Transport.
    ConnectionRefused,
    ConnectionReset,
    NetworkUnreachable,
    HostUnreachable,

    // TLS.
    Tls(String),
    TlsCertificateVerificationFailed,

    // DNS.
    DnsError(String),
    DnsHostNotFound,

    // HTTP/1.1 protocol.
    InvalidStatusLine,
    InvalidHeader(String),
    InvalidContentLength,
    ChunkedEncodingError(String),
    UnsupportedTransferEncoding(String),

    // Content codings.
    CompressedBrotliNotImplemented,
    CompressionError(String),

    // HTTP/2.
    H2GoAway { last_stream_id: u32, error_code: u32 },
    H2StreamReset(u32),
    H2FlowControl,
    H2FrameSize,
    H2Protocol(String),

    // HTTP/3.
    H3Transport(String),
    H3Stream(String),

    // Request construction and limits.
    InvalidUrl(String),
    InvalidMethod(String),
    HeadersTooLarge,
    BodyTooLarge,
    TooManyRedirects,
    RedirectLoopDetected,

    // Pool.
    TooManyConnectionsForHost,
    PoolExhausted,

    Canceled,
    UnexpectedEof,
    InvalidData(String),
    UnsupportedFeature(String),
    Io(io::Error),

    /// An error annotated with request context.
    Context {
        source: Box<HttpError>,
        context: ErrorContext,
    },
}

impl HttpError {
    /// Attach the request URL to this error for diagnostics.
    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.with_context(ErrorContext {
            url: Some(url.into()),
            ..Default::default()
        })
    }

    pub fn with_context(self, context: ErrorContext) -> Self {
        match self {
            // Merge rather than nest when already annotated.
            HttpError::Context { source, context: mut existing } => {
                if existing.message.is_none() {
                    existing.message = context.message;
                }
                if existing.url.is_none() {
                    existing.url = context.url;
                }
                if existing.status_code.is_none() {
                    existing.status_code = context.status_code;
                }
                if existing.system_code.is_none() {
                    existing.system_code = context.system_code;
                }
                HttpError::Context { source, context: existing }
            }
            other => HttpError::Context {
                source: Box::new(other),
                context,
            },
        }
    }

    /// The underlying error, unwrapping any context annotation.
    pub fn root(&self) -> &HttpError {
        match self {
            HttpError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Transient network errors the retry layer may reattempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            HttpError::ConnectTimeout
                | HttpError::ReadTimeout
                | HttpError::WriteTimeout
                | HttpError::ConnectionRefused
                | HttpError::ConnectionReset
                | HttpError::NetworkUnreachable
                | HttpError::HostUnreachable
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.root(),
            HttpError::ConnectTimeout
                | HttpError::ReadTimeout
                | HttpError::WriteTimeout
                | HttpError::TotalTimeout
        )
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::ConnectTimeout => write!(f, "connect timed out"),
            HttpError::ReadTimeout => write!(f, "read timed out"),
            HttpError::WriteTimeout => write!(f, "write timed out"),
            HttpError::TotalTimeout => write!(f, "request deadline exceeded"),
            HttpError::ConnectionRefused => write!(f, "connection refused"),
            HttpError::ConnectionReset => write!(f, "connection reset by peer"),
            HttpError::NetworkUnreachable => write!(f, "network unreachable"),
            HttpError::HostUnreachable => write!(f, "host unreachable"),
            HttpError::Tls(m) => write!(f, "TLS error: {}", m),
            HttpError::TlsCertificateVerificationFailed => {
                write!(f, "TLS certificate verification failed")
            }
            HttpError::DnsError(m) => write!(f, "DNS error: {}", m),
            HttpError::DnsHostNotFound => write!(f, "host not found"),
            HttpError::InvalidStatusLine => write!(f, "invalid status line"),
            HttpError::InvalidHeader(m) => write!(f, "invalid header: {}", m),
            HttpError::InvalidContentLength => write!(f, "invalid Content-Length"),
            HttpError::ChunkedEncodingError(m) => write!(f, "chunked encoding error: {}", m),
            HttpError::UnsupportedTransferEncoding(m) => {
                write!(f, "unsupported transfer encoding: {}", m)
            }
            HttpError::CompressedBrotliNotImplemented => {
                write!(f, "compressed brotli meta-blocks not implemented")
            }
            HttpError::CompressionError(m) => write!(f, "compression error: {}", m),
            HttpError::H2GoAway { last_stream_id, error_code } => write!(
                f,
                "HTTP/2 GOAWAY: last stream {} error {:#x}",
                last_stream_id, error_code
            ),
            HttpError::H2StreamReset(code) => write!(f, "HTTP/2 stream reset: error {:#x}", code),
            HttpError::H2FlowControl => write!(f, "HTTP/2 flow control violation"),
            HttpError::H2FrameSize => write!(f, "HTTP/2 frame size error"),
            HttpError::H2Protocol(m) => write!(f, "HTTP/2 protocol error: {}", m),
            HttpError::H3Transport(m) => write!(f, "HTTP/3 transport error: {}", m),
            HttpError::H3Stream(m) => write!(f, "HTTP/3 stream error: {}", m),
            HttpError::InvalidUrl(m) => write!(f, "invalid URL: {}", m),
            HttpError::InvalidMethod(m) => write!(f, "invalid method: {}", m),
            HttpError::HeadersTooLarge => write!(f, "response headers too large"),
            HttpError::BodyTooLarge => write!(f, "response body too large"),
            HttpError::TooManyRedirects => write!(f, "too many redirects"),
            HttpError::RedirectLoopDetected => write!(f, "redirect loop detected"),
            HttpError::TooManyConnectionsForHost => {
                write!(f, "too many connections for host")
            }
            HttpError::PoolExhausted => write!(f, "connection pool exhausted"),
            HttpError::Canceled => write!(f, "request canceled"),
            HttpError::UnexpectedEof => write!(f, "unexpected end of stream"),
            HttpError::InvalidData(m) => write!(f, "invalid data: {}", m),
            HttpError::UnsupportedFeature(m) => write!(f, "unsupported: {}", m),
            HttpError::Io(e) => write!(f, "I/O error: {}", e),
            HttpError::Context { source, context } => {
                write!(f, "{}", source)?;
                if let Some(url) = &context.url {
                    write!(f, " (url: {})", url)?;
                }
                if let Some(status) = context.status_code {
                    write!(f, " (status: {})", status)?;
                }
                if let Some(m) = &context.message {
                    write!(f, ": {}", m)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpError::Io(e) => Some(e),
            HttpError::Context { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => HttpError::ConnectionRefused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                HttpError::ConnectionReset
            }
            io::ErrorKind::TimedOut => HttpError::ReadTimeout,
            io::ErrorKind::UnexpectedEof => HttpError::UnexpectedEof,
            io::ErrorKind::HostUnreachable => HttpError::HostUnreachable,
            io::ErrorKind::NetworkUnreachable => HttpError::NetworkUnreachable,
            _ => HttpError::Io(e),
        }
    }
}
