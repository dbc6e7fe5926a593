/*
 * client.rs
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

//! WebSocket client: connect to a ws:// or wss:// URL, perform the opening
//! handshake, return a WebSocketConnection.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::config::TlsConfig;
use crate::error::HttpError;
use crate::net;
use crate::protocol::http::connection::HttpStream;
use crate::protocol::http::h1::ResponseParser;
use crate::protocol::websocket::connection::WebSocketConnection;
use crate::protocol::websocket::handshake::{
    build_handshake_request, generate_key, parse_101_response, verify_accept,
};
use crate::url::{Scheme, Url};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// WebSocket client entry point.
pub struct WebSocketClient;

impl WebSocketClient {
    /// Connect with default TLS options.
    pub async fn connect(url: &str) -> Result<WebSocketConnection, HttpError> {
        Self::connect_with_tls(url, &TlsConfig::default()).await
    }

    /// Connect to the given WebSocket URL, perform the opening handshake,
    /// and return a connection ready for `run`/`send_*`.
    pub async fn connect_with_tls(
        url: &str,
        tls: &TlsConfig,
    ) -> Result<WebSocketConnection, HttpError> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme, Scheme::Ws | Scheme::Wss) {
            return Err(HttpError::InvalidUrl("URL scheme must be ws or wss".into()));
        }

        let tcp = net::connect_tcp(&url.host, url.port, CONNECT_TIMEOUT).await?;
        let mut stream = if url.scheme == Scheme::Wss {
            // WebSocket over TLS negotiates plain http/1.1, never h2.
            let mut tls = tls.clone();
            tls.alpn_protocols = vec!["http/1.1".to_string()];
            let config = net::client_config(&tls);
            HttpStream::Tls(net::connect_tls(tcp, &url.host, config, CONNECT_TIMEOUT).await?)
        } else {
            HttpStream::Plain(tcp)
        };

        let key = generate_key()?;
        let request = build_handshake_request(&url, &key);
        stream.write_all(&request).await?;
        stream.flush().await?;

        let mut read_buf = BytesMut::with_capacity(4096);
        let mut parser = ResponseParser::new();
        loop {
            let mut tmp = [0u8; 4096];
            let n = stream.read(&mut tmp).await?;
            if n == 0 {
                return Err(HttpError::UnexpectedEof);
            }
            read_buf.extend_from_slice(&tmp[..n]);
            if let Some((status, accept)) = parse_101_response(&mut parser, &mut read_buf)? {
                if status != 101 {
                    return Err(HttpError::InvalidData(format!(
                        "expected 101 Switching Protocols, got {}",
                        status
                    )));
                }
                verify_accept(accept.as_deref(), &key)?;
                break;
            }
        }
        debug!(url = %url, "websocket handshake complete");

        // Bytes past the 101 headers are the first frames.
        Ok(WebSocketConnection::new(stream, read_buf))
    }
}
