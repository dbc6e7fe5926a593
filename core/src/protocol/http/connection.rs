/*
 * connection.rs
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

//! Pooled connection: one TCP or TLS stream plus its parse buffer and
//! lifecycle bookkeeping. The negotiated protocol decides whether requests
//! go through the HTTP/1.1 engine or an H2Connection.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as TokioTlsStream;

use crate::protocol::http::h2::H2Connection;
use crate::protocol::http::response::Version;
use crate::url::Scheme;

/// Unified stream: plain TCP or TLS. Implements AsyncRead + AsyncWrite.
pub enum HttpStream {
    Plain(TcpStream),
    Tls(TokioTlsStream<TcpStream>),
}

impl AsyncRead for HttpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Pool key: connections are interchangeable within (scheme, host, port).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Active,
    /// Failed mid-exchange; the pool destroys it on release.
    Closing,
    Closed,
}

/// Protocol engine bound to the stream at connect time (ALPN).
pub enum Transport {
    H1(HttpStream),
    H2(Box<H2Connection<HttpStream>>),
}

/// A live connection owned either by one caller (active) or by the pool
/// (idle). The parse buffer persists across requests so pipelined leftovers
/// are not lost.
pub struct Connection {
    pub id: u64,
    key: PoolKey,
    pub transport: Transport,
    /// HTTP/1.1 read buffer; unused for H2 (the engine keeps its own).
    pub read_buf: BytesMut,
    created: Instant,
    last_used: Instant,
    use_count: u64,
    state: ConnState,
}

impl Connection {
    pub fn new(id: u64, key: PoolKey, transport: Transport) -> Self {
        let now = Instant::now();
        Self {
            id,
            key,
            transport,
            read_buf: BytesMut::with_capacity(8192),
            created: now,
            last_used: now,
            use_count: 0,
            state: ConnState::Active,
        }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn version(&self) -> Version {
        match &self.transport {
            Transport::H1(_) => Version::Http11,
            Transport::H2(_) => Version::H2,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Mark checkout from the pool.
    pub fn begin_use(&mut self) {
        self.state = ConnState::Active;
        self.use_count += 1;
        self.last_used = Instant::now();
    }

    pub fn mark_idle(&mut self) {
        self.state = ConnState::Idle;
        self.last_used = Instant::now();
    }

    /// Flag the connection for destruction on release.
    pub fn mark_closing(&mut self) {
        self.state = ConnState::Closing;
    }

    /// Whether the pool may park this connection for reuse.
    pub fn is_reusable(&self) -> bool {
        if self.state == ConnState::Closing || self.state == ConnState::Closed {
            return false;
        }
        match &self.transport {
            Transport::H1(_) => true,
            Transport::H2(h2) => h2.can_reuse(),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("version", &self.version())
            .field("state", &self.state)
            .field("use_count", &self.use_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn local_pair() -> HttpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        let client = TcpStream::connect(addr).await.unwrap();
        accept.await.unwrap();
        HttpStream::Plain(client)
    }

    #[tokio::test]
    async fn lifecycle_bookkeeping() {
        let key = PoolKey {
            scheme: Scheme::Http,
            host: "localhost".into(),
            port: 80,
        };
        let stream = local_pair().await;
        let mut conn = Connection::new(7, key.clone(), Transport::H1(stream));
        assert_eq!(conn.id, 7);
        assert_eq!(conn.version(), Version::Http11);
        assert_eq!(conn.use_count(), 0);
        conn.begin_use();
        conn.begin_use();
        assert_eq!(conn.use_count(), 2);
        assert_eq!(conn.state(), ConnState::Active);
        conn.mark_idle();
        assert_eq!(conn.state(), ConnState::Idle);
        assert!(conn.is_reusable());
        conn.mark_closing();
        assert!(!conn.is_reusable());
        assert_eq!(key.to_string(), "http://localhost:80");
    }
}
