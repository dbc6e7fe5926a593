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

//! HTTP client engine: URL resolution, pooled connections, TLS with ALPN,
//! request serialization, response parsing and body framing, automatic
//! decompression, redirects, and retry with exponential backoff.
//!
//! The h1 path drives the push parser from a read loop on the caller's
//! task; the h2 path hands the exchange to the connection's stream engine.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ErrorContext, HttpError};
use crate::headers::HeaderMap;
use crate::net;
use crate::protocol::http::chunked;
use crate::protocol::http::coding::{self, Coding};
use crate::protocol::http::connection::{Connection, HttpStream, PoolKey, Transport};
use crate::protocol::http::h1::{
    get_content_length, is_chunked_encoding, should_keep_alive, H1ResponseHandler, ParseState,
    ResponseParser,
};
use crate::protocol::http::h2::H2Connection;
use crate::protocol::http::pool::{Acquired, ConnectionPool, PoolStats};
use crate::protocol::http::redirect::{self, RedirectAction};
use crate::protocol::http::request::{Body, Method, Request};
use crate::protocol::http::response::{Response, Version};
use crate::url::{Scheme, Url};

/// Body as it goes on the wire. Empty and Bytes are replayable; a reader is
/// consumed once and sent chunked.
enum WireBody {
    Empty,
    Bytes(Vec<u8>),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl WireBody {
    fn is_replayable(&self) -> bool {
        !matches!(self, WireBody::Reader(_))
    }

    fn len(&self) -> Option<u64> {
        match self {
            WireBody::Empty => Some(0),
            WireBody::Bytes(b) => Some(b.len() as u64),
            WireBody::Reader(_) => None,
        }
    }
}

/// HTTP client over a shared connection pool. Cloning is cheap and clones
/// share the pool.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    pool: Arc<ConnectionPool>,
    tls_config: Arc<tokio_rustls::rustls::client::ClientConfig>,
}

impl Client {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let pool = ConnectionPool::new(config.pool.clone(), config.enable_keep_alive);
        let tls_config = net::client_config(&config.tls);
        Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
            tls_config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Send a request, following redirects and retrying transient failures
    /// per the client configuration.
    pub async fn send(&self, request: Request) -> Result<Response, HttpError> {
        let url_for_context = request.url.clone();
        let deadline = request
            .timeout
            .or(self.config.total_timeout)
            .map(|t| Instant::now() + t);
        self.send_inner(request, deadline)
            .await
            .map_err(|e| e.with_url(url_for_context))
    }

    async fn send_inner(
        &self,
        request: Request,
        deadline: Option<Instant>,
    ) -> Result<Response, HttpError> {
        let mut url = Url::parse(&request.url)?;
        if !matches!(url.scheme, Scheme::Http | Scheme::Https) {
            return Err(HttpError::InvalidUrl(format!(
                "scheme {} is not an HTTP scheme",
                url.scheme.as_str()
            )));
        }
        let mut method = request.method;
        let mut headers = request.headers;
        let mut body = materialize_body(request.body, &mut headers).await?;

        let mut redirects = 0u32;
        loop {
            let response = self
                .attempt_with_retries(method, &url, &headers, &mut body, deadline)
                .await?;

            let location = response.header("location").map(|s| s.to_string());
            let action = redirect::evaluate(
                self.config.redirect_policy,
                self.config.allow_insecure_redirects,
                response.status,
                method,
                &url,
                location.as_deref(),
            )?;
            match action {
                RedirectAction::Return => return Ok(response),
                RedirectAction::Follow {
                    url: next,
                    method: next_method,
                    keep_body,
                } => {
                    if keep_body && !body.is_replayable() {
                        // A consumed reader body cannot be resent.
                        return Ok(response);
                    }
                    redirects += 1;
                    if redirects > self.config.max_redirects {
                        return Err(HttpError::TooManyRedirects);
                    }
                    debug!(status = response.status, from = %url, to = %next, "following redirect");
                    redirect::strip_headers(&mut headers, keep_body);
                    if !keep_body {
                        body = WireBody::Empty;
                    }
                    method = next_method;
                    url = next;
                }
            }
        }
    }

    async fn attempt_with_retries(
        &self,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        body: &mut WireBody,
        deadline: Option<Instant>,
    ) -> Result<Response, HttpError> {
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            check_deadline(deadline)?;
            let result = self.attempt(method, url, headers, body, deadline).await;
            let can_retry = attempt < retry.max_retries && body.is_replayable();
            match result {
                Ok(response)
                    if retry.retry_on_5xx && response.status >= 500 && can_retry =>
                {
                    warn!(status = response.status, attempt, "retrying after 5xx");
                }
                Ok(response) => return Ok(response),
                Err(e) if can_retry && self.error_is_retryable(&e) => {
                    warn!(error = %e, attempt, "retrying after transient error");
                }
                Err(e) => return Err(e),
            }
            let backoff = backoff_delay(retry.backoff_initial, retry.backoff_cap, attempt);
            sleep_within_deadline(backoff, deadline).await?;
            attempt += 1;
        }
    }

    fn error_is_retryable(&self, e: &HttpError) -> bool {
        if !e.is_retryable() {
            return false;
        }
        let retry = &self.config.retry;
        if e.is_timeout() {
            retry.retry_on_timeout
        } else {
            retry.retry_on_connection_error
        }
    }

    /// One request/response exchange on one connection.
    async fn attempt(
        &self,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        body: &mut WireBody,
        deadline: Option<Instant>,
    ) -> Result<Response, HttpError> {
        let key = PoolKey {
            scheme: url.scheme,
            host: url.host.clone(),
            port: url.port,
        };
        let mut conn = match self.pool.acquire(&key)? {
            Acquired::Reused(conn) => conn,
            Acquired::Permit => match self.dial(&key, deadline).await {
                Ok(conn) => conn,
                Err(e) => {
                    self.pool.discard(&key);
                    return Err(e);
                }
            },
        };
        conn.begin_use();
        trace!(conn = conn.id, uses = conn.use_count(), %key, "connection checked out");

        match self.exchange(&mut conn, method, url, headers, body, deadline).await {
            Ok((response, keep_alive)) => {
                self.pool.release(conn, keep_alive);
                Ok(response)
            }
            Err(e) => {
                conn.mark_closing();
                self.pool.release(conn, false);
                Err(e)
            }
        }
    }

    async fn dial(&self, key: &PoolKey, deadline: Option<Instant>) -> Result<Connection, HttpError> {
        let connect_timeout = clamp_to_deadline(self.config.connect_timeout, deadline)?;
        let tcp = net::connect_tcp(&key.host, key.port, connect_timeout).await?;
        let transport = if key.scheme.is_secure() {
            let tls = net::connect_tls(tcp, &key.host, self.tls_config.clone(), connect_timeout).await?;
            let alpn = net::negotiated_alpn(&tls);
            if alpn.as_deref() == Some(b"h2") {
                let h2 = H2Connection::handshake(
                    HttpStream::Tls(tls),
                    self.config.read_timeout,
                    self.config.write_timeout,
                    self.config.max_body_size,
                )
                .await?;
                Transport::H2(Box::new(h2))
            } else {
                Transport::H1(HttpStream::Tls(tls))
            }
        } else {
            Transport::H1(HttpStream::Plain(tcp))
        };
        Ok(Connection::new(self.pool.next_id(), key.clone(), transport))
    }

    async fn exchange(
        &self,
        conn: &mut Connection,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        body: &mut WireBody,
        deadline: Option<Instant>,
    ) -> Result<(Response, bool), HttpError> {
        match &mut conn.transport {
            Transport::H2(h2) => {
                // The stream engine wants a contiguous body; a reader is
                // drained once and kept for later hops.
                if let WireBody::Reader(reader) = body {
                    let mut buffered = Vec::new();
                    reader.read_to_end(&mut buffered).await?;
                    *body = WireBody::Bytes(buffered);
                }
                let payload = match body {
                    WireBody::Bytes(b) => Some(b.as_slice()),
                    _ => None,
                };
                let mut augmented = headers.clone();
                self.apply_default_headers(&mut augmented);
                let response = h2.send_request(method, url, &augmented, payload).await?;
                let response = self.postprocess(response)?;
                Ok((response, h2.can_reuse()))
            }
            Transport::H1(_) => {
                let (response, keep_alive) =
                    self.exchange_h1(conn, method, url, headers, body, deadline).await?;
                let response = self.postprocess(response)?;
                Ok((response, keep_alive))
            }
        }
    }

    fn apply_default_headers(&self, headers: &mut HeaderMap) {
        if !headers.contains("user-agent") {
            headers.set("User-Agent", self.config.user_agent.clone());
        }
        if self.config.auto_decompress && !headers.contains("accept-encoding") {
            // br is advertised only for uncompressed-capable peers; gzip and
            // deflate decode fully, so offer just those.
            headers.set("Accept-Encoding", "gzip, deflate");
        }
    }

    async fn exchange_h1(
        &self,
        conn: &mut Connection,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        body: &mut WireBody,
        deadline: Option<Instant>,
    ) -> Result<(Response, bool), HttpError> {
        let mut augmented = headers.clone();
        self.apply_default_headers(&mut augmented);
        let head = build_request_head(
            method,
            url,
            &augmented,
            body.len(),
            self.config.enable_keep_alive,
        );

        let stream = match &mut conn.transport {
            Transport::H1(s) => s,
            Transport::H2(_) => unreachable!("exchange_h1 called with h2 transport"),
        };

        // Write head and body.
        let write_timeout = clamp_to_deadline(self.config.write_timeout, deadline)?;
        timeout(write_timeout, stream.write_all(head.as_bytes()))
            .await
            .map_err(|_| HttpError::WriteTimeout)?
            .map_err(HttpError::from)?;
        match body {
            WireBody::Empty => {}
            WireBody::Bytes(data) => {
                timeout(write_timeout, stream.write_all(data))
                    .await
                    .map_err(|_| HttpError::WriteTimeout)?
                    .map_err(HttpError::from)?;
            }
            WireBody::Reader(reader) => {
                // Unknown length: chunked transfer coding.
                let mut chunk = [0u8; 8192];
                loop {
                    let n = reader.read(&mut chunk).await?;
                    if n == 0 {
                        break;
                    }
                    let mut framed = Vec::with_capacity(n + 16);
                    chunked::encode_chunk(&chunk[..n], &mut framed);
                    timeout(write_timeout, stream.write_all(&framed))
                        .await
                        .map_err(|_| HttpError::WriteTimeout)?
                        .map_err(HttpError::from)?;
                }
                let mut terminator = Vec::new();
                chunked::encode_final_chunk(&[], &mut terminator);
                timeout(write_timeout, stream.write_all(&terminator))
                    .await
                    .map_err(|_| HttpError::WriteTimeout)?
                    .map_err(HttpError::from)?;
            }
        }
        timeout(write_timeout, stream.flush())
            .await
            .map_err(|_| HttpError::WriteTimeout)?
            .map_err(HttpError::from)?;
        trace!(conn = conn.id, "{} {} written", method.as_str(), url.request_target());

        // Read and parse the response.
        let mut parser = ResponseParser::new();
        let mut collector = ResponseCollector::new(self.config.max_body_size);
        let mut close_delimited = false;
        loop {
            parser.receive(&mut conn.read_buf, &mut collector)?;
            if parser.state() == ParseState::HeadersComplete {
                let chunked_body = is_chunked_encoding(&collector.headers);
                validate_transfer_encoding(&collector.headers)?;
                let content_length = get_content_length(&collector.headers)?;
                let has_body = response_has_body(method, collector.status);
                close_delimited = has_body && !chunked_body && content_length.is_none();
                if has_body {
                    collector.start_body();
                }
                parser.set_body_mode(content_length, chunked_body, has_body);
                continue;
            }
            if parser.state() == ParseState::Idle {
                break;
            }
            let read_timeout = clamp_to_deadline(self.config.read_timeout, deadline)?;
            let mut tmp = [0u8; 8192];
            let n = timeout(read_timeout, stream.read(&mut tmp))
                .await
                .map_err(|_| HttpError::ReadTimeout)?
                .map_err(HttpError::from)?;
            if n == 0 {
                if collector.status == 0 {
                    // The peer hung up before any status byte; for a pooled
                    // connection this is the usual stale-socket signature.
                    return Err(HttpError::ConnectionReset);
                }
                parser.finish_eof(&mut collector)?;
                break;
            }
            conn.read_buf.extend_from_slice(&tmp[..n]);
        }
        if collector.overflow {
            return Err(HttpError::BodyTooLarge);
        }

        let version = collector.version;
        let keep_alive = !close_delimited
            && self.config.enable_keep_alive
            && should_keep_alive(version, &collector.headers);
        let response = collector.into_response();
        debug!(conn = conn.id, status = response.status, keep_alive, "response complete");
        Ok((response, keep_alive))
    }

    /// Transparent content decoding, applied to the buffered body.
    fn postprocess(&self, mut response: Response) -> Result<Response, HttpError> {
        if !self.config.auto_decompress {
            return Ok(response);
        }
        let coding = match response.header("content-encoding") {
            Some(token) => match Coding::from_token(token) {
                Some(c) => c,
                // Unknown coding: hand the body through untouched.
                None => return Ok(response),
            },
            None => return Ok(response),
        };
        if coding == Coding::Identity {
            return Ok(response);
        }
        let decoded = coding::decompress(coding, &response.body)?;
        response.body = Bytes::from(decoded);
        response.headers.remove("content-encoding");
        response.headers.remove("content-length");
        Ok(response)
    }

    // Convenience operations.

    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        self.send(Request::builder(Method::Get, url).build()?).await
    }

    pub async fn post(&self, url: &str, body: impl Into<Vec<u8>>) -> Result<Response, HttpError> {
        self.send(Request::builder(Method::Post, url).body(body.into()).build()?)
            .await
    }

    pub async fn put(&self, url: &str, body: impl Into<Vec<u8>>) -> Result<Response, HttpError> {
        self.send(Request::builder(Method::Put, url).body(body.into()).build()?)
            .await
    }

    pub async fn patch(&self, url: &str, body: impl Into<Vec<u8>>) -> Result<Response, HttpError> {
        self.send(Request::builder(Method::Patch, url).body(body.into()).build()?)
            .await
    }

    pub async fn delete(&self, url: &str) -> Result<Response, HttpError> {
        self.send(Request::builder(Method::Delete, url).build()?).await
    }

    pub async fn head(&self, url: &str) -> Result<Response, HttpError> {
        self.send(Request::builder(Method::Head, url).build()?).await
    }

    /// GET a URL and write the response body to a file. Non-2xx statuses
    /// are reported as errors with the status attached.
    pub async fn download(&self, url: &str, path: impl AsRef<Path>) -> Result<u64, HttpError> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Err(HttpError::InvalidData("download failed".into()).with_context(
                ErrorContext {
                    url: Some(url.to_string()),
                    status_code: Some(response.status),
                    ..Default::default()
                },
            ));
        }
        let len = response.body.len() as u64;
        tokio::fs::write(path, &response.body).await?;
        Ok(len)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects h1 parser events into a Response, enforcing the body cap.
struct ResponseCollector {
    version: Version,
    status: u16,
    reason: String,
    headers: HeaderMap,
    body: BytesMut,
    max_body_size: usize,
    overflow: bool,
}

impl ResponseCollector {
    fn new(max_body_size: usize) -> Self {
        Self {
            version: Version::Http11,
            status: 0,
            reason: String::new(),
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            max_body_size,
            overflow: false,
        }
    }

    fn into_response(self) -> Response {
        let mut response = Response::new(self.status, self.version);
        response.reason = self.reason;
        response.headers = self.headers;
        response.body = self.body.freeze();
        response
    }
}

impl H1ResponseHandler for ResponseCollector {
    fn status(&mut self, version: Version, code: u16, reason: Option<&str>) {
        self.version = version;
        self.status = code;
        self.reason = reason.unwrap_or("").to_string();
    }

    fn header(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
    }

    fn start_body(&mut self) {}

    fn body_chunk(&mut self, data: &[u8]) {
        if self.body.len() + data.len() > self.max_body_size {
            self.overflow = true;
            return;
        }
        self.body.extend_from_slice(data);
    }

    fn end_body(&mut self) {}

    fn trailer(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
    }

    fn complete(&mut self) {}
}

/// Serialize the request head. Host is always present (scheme-default port
/// omitted); Content-Length is emitted when the body length is known and
/// the caller did not set it; unknown-length bodies go chunked.
fn build_request_head(
    method: Method,
    url: &Url,
    headers: &HeaderMap,
    body_len: Option<u64>,
    keep_alive: bool,
) -> String {
    let mut head = format!("{} {} HTTP/1.1\r\n", method.as_str(), url.request_target());
    if !headers.contains("host") {
        head.push_str("Host: ");
        head.push_str(&url.authority());
        head.push_str("\r\n");
    }
    for (name, value) in headers.iter() {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    match body_len {
        Some(0) => {
            // Methods that carry a body advertise its absence explicitly.
            if matches!(method, Method::Post | Method::Put | Method::Patch)
                && !headers.contains("content-length")
            {
                head.push_str("Content-Length: 0\r\n");
            }
        }
        Some(len) => {
            if !headers.contains("content-length") {
                head.push_str(&format!("Content-Length: {}\r\n", len));
            }
        }
        None => {
            if !headers.contains("transfer-encoding") {
                head.push_str("Transfer-Encoding: chunked\r\n");
            }
        }
    }
    if !keep_alive && !headers.contains("connection") {
        head.push_str("Connection: close\r\n");
    }
    head.push_str("\r\n");
    head
}

/// HEAD responses and 1xx/204/304 statuses never carry a body.
fn response_has_body(method: Method, status: u16) -> bool {
    if method == Method::Head {
        return false;
    }
    !(status < 200 || status == 204 || status == 304)
}

/// Transfer-Encoding tokens other than chunked/identity are not decodable.
fn validate_transfer_encoding(headers: &HeaderMap) -> Result<(), HttpError> {
    for value in headers.get_all("transfer-encoding") {
        for token in value.split(',') {
            let token = token.trim();
            if token.is_empty()
                || token.eq_ignore_ascii_case("chunked")
                || token.eq_ignore_ascii_case("identity")
            {
                continue;
            }
            return Err(HttpError::UnsupportedTransferEncoding(token.to_string()));
        }
    }
    Ok(())
}

async fn materialize_body(body: Body, headers: &mut HeaderMap) -> Result<WireBody, HttpError> {
    match body {
        Body::None => Ok(WireBody::Empty),
        Body::Bytes(data) => Ok(WireBody::Bytes(data)),
        Body::File(path) => {
            let data = tokio::fs::read(&path).await?;
            Ok(WireBody::Bytes(data))
        }
        Body::Reader(reader) => Ok(WireBody::Reader(reader)),
        Body::Multipart(builder) => {
            if !headers.contains("content-type") {
                headers.set("Content-Type", builder.content_type());
            }
            Ok(WireBody::Bytes(builder.build()))
        }
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), HttpError> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(HttpError::TotalTimeout),
        _ => Ok(()),
    }
}

/// The smaller of the per-operation timeout and the time left on the total
/// deadline.
fn clamp_to_deadline(base: Duration, deadline: Option<Instant>) -> Result<Duration, HttpError> {
    match deadline {
        Some(d) => {
            let remaining = d
                .checked_duration_since(Instant::now())
                .ok_or(HttpError::TotalTimeout)?;
            Ok(base.min(remaining))
        }
        None => Ok(base),
    }
}

fn backoff_delay(initial: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.min(16);
    (initial * factor).min(cap)
}

async fn sleep_within_deadline(delay: Duration, deadline: Option<Instant>) -> Result<(), HttpError> {
    let delay = clamp_to_deadline(delay, deadline)?;
    tokio::time::sleep(delay).await;
    Ok(())
}
