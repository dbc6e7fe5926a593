/*
 * config.rs
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

//! Client configuration: timeouts, redirects, retries, pool, and TLS options.

use std::time::Duration;

/// How the client follows 3xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Never follow redirects; the 3xx response is returned as-is.
    None,
    /// Follow only for GET and HEAD requests.
    Safe,
    /// Follow; 301/302/303 downgrade POST/PUT/PATCH to GET and drop the body.
    Normal,
    /// Follow; method and body are preserved on every hop.
    Strict,
}

/// Minimum TLS protocol version offered in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Verify the server certificate against the root store with SNI.
    /// When false, all certificate validation is skipped.
    pub verify_certificates: bool,
    /// Floor for the handshake. rustls supports 1.2 and 1.3; requests for
    /// 1.0/1.1 are clamped to 1.2.
    pub min_version: TlsVersion,
    /// ALPN protocols offered in order; first mutually accepted wins.
    pub alpn_protocols: Vec<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify_certificates: true,
            min_version: TlsVersion::Tls12,
            alpn_protocols: vec!["h2".to_string(), "http/1.1".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_per_host: usize,
    pub max_total: usize,
    /// Idle connections older than this are evicted on the next acquire.
    pub idle_timeout: Duration,
    /// Total lifetime cap for a connection, idle or not. None disables.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_host: 10,
            max_total: 100,
            idle_timeout: Duration::from_millis(90_000),
            max_lifetime: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// First backoff delay; doubled on each subsequent attempt.
    pub backoff_initial: Duration,
    pub backoff_cap: Duration,
    pub retry_on_timeout: bool,
    pub retry_on_connection_error: bool,
    pub retry_on_5xx: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_initial: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(10),
            retry_on_timeout: true,
            retry_on_connection_error: true,
            retry_on_5xx: false,
        }
    }
}

/// Top-level client options. `Default` gives the documented defaults.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Deadline for the whole request including redirects. None disables.
    pub total_timeout: Option<Duration>,
    pub max_redirects: u32,
    pub redirect_policy: RedirectPolicy,
    /// Permit following an https URL to an http one.
    pub allow_insecure_redirects: bool,
    pub user_agent: String,
    /// Advertise Accept-Encoding and transparently decode the response body.
    pub auto_decompress: bool,
    /// Largest response body buffered into a Response.
    pub max_body_size: usize,
    pub enable_keep_alive: bool,
    pub retry: RetryConfig,
    pub pool: PoolConfig,
    pub tls: TlsConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            total_timeout: None,
            max_redirects: 10,
            redirect_policy: RedirectPolicy::Normal,
            allow_insecure_redirects: false,
            user_agent: format!("zhttp/{}", env!("CARGO_PKG_VERSION")),
            auto_decompress: true,
            max_body_size: 10 * 1024 * 1024,
            enable_keep_alive: true,
            retry: RetryConfig::default(),
            pool: PoolConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_defaults() {
        let c = ClientConfig::default();
        assert_eq!(c.max_redirects, 10);
        assert_eq!(c.retry.max_retries, 3);
        assert_eq!(c.user_agent, "zhttp/0.1.0");
        assert!(c.auto_decompress);
        assert_eq!(c.max_body_size, 10 * 1024 * 1024);
        assert_eq!(c.pool.max_per_host, 10);
        assert_eq!(c.pool.max_total, 100);
        assert_eq!(c.pool.idle_timeout, Duration::from_millis(90_000));
        assert!(c.tls.verify_certificates);
        assert_eq!(c.tls.min_version, TlsVersion::Tls12);
        assert_eq!(c.tls.alpn_protocols, vec!["h2", "http/1.1"]);
    }
}
