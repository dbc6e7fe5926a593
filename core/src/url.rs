/*
 * url.rs
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

//! URL parsing for http, https, ws, wss. Scheme-defaulted ports, IPv6 literals,
//! path/query splitting, and reference resolution for redirects.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::HttpError;

/// Bytes escaped when serializing the request target. '%' is left alone so
/// already-encoded paths are not double-encoded.
const TARGET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

/// URL scheme. Determines the default port and whether TLS is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http | Scheme::Ws => 80,
            Scheme::Https | Scheme::Wss => 443,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Https | Scheme::Wss)
    }

    fn parse(s: &str) -> Option<Scheme> {
        if s.eq_ignore_ascii_case("http") {
            Some(Scheme::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Some(Scheme::Https)
        } else if s.eq_ignore_ascii_case("ws") {
            Some(Scheme::Ws)
        } else if s.eq_ignore_ascii_case("wss") {
            Some(Scheme::Wss)
        } else {
            None
        }
    }
}

/// Parsed URL components. Path defaults to "/"; port defaults by scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Option<String>,
}

impl Url {
    /// Parse an absolute URL. Fragments are stripped.
    pub fn parse(input: &str) -> Result<Url, HttpError> {
        let input = input.trim();
        let (scheme_str, rest) = input
            .split_once("://")
            .ok_or_else(|| HttpError::InvalidUrl(format!("missing scheme: {}", input)))?;
        let scheme = Scheme::parse(scheme_str)
            .ok_or_else(|| HttpError::InvalidUrl(format!("unsupported scheme: {}", scheme_str)))?;

        // Strip any fragment before splitting authority from path.
        let rest = match rest.find('#') {
            Some(i) => &rest[..i],
            None => rest,
        };

        // A '?' directly after the authority starts the query with path "/".
        let (authority, path_and_query) = match rest.find(['/', '?']) {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };

        let (host, port) = split_host_port(authority, scheme.default_port())?;
        if host.is_empty() {
            return Err(HttpError::InvalidUrl("empty host".into()));
        }

        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (path_and_query, None),
        };
        let path = if path.is_empty() {
            "/".to_string()
        } else if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        Ok(Url {
            scheme,
            host: host.to_ascii_lowercase(),
            port,
            path,
            query,
        })
    }

    pub fn is_secure(&self) -> bool {
        self.scheme.is_secure()
    }

    /// host[:port], omitting the port when it equals the scheme default.
    /// This is also the value of the Host header.
    pub fn authority(&self) -> String {
        let host = self.host_display();
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    fn host_display(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// The request target written on the wire: path[?query], with unsafe
    /// bytes percent-encoded.
    pub fn request_target(&self) -> String {
        let path = utf8_percent_encode(&self.path, TARGET).to_string();
        match &self.query {
            Some(q) => format!("{}?{}", path, utf8_percent_encode(q, TARGET)),
            None => path,
        }
    }

    /// Resolve a redirect Location reference against this URL. Handles
    /// absolute URLs, scheme-relative (//host/...), absolute-path, and
    /// relative references.
    pub fn resolve(&self, location: &str) -> Result<Url, HttpError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(HttpError::InvalidUrl("empty redirect location".into()));
        }
        if location.contains("://") {
            return Url::parse(location);
        }
        if let Some(rest) = location.strip_prefix("//") {
            return Url::parse(&format!("{}://{}", self.scheme.as_str(), rest));
        }
        let mut resolved = self.clone();
        if let Some(abs) = location.strip_prefix('/') {
            let (path, query) = match abs.split_once('?') {
                Some((p, q)) => (format!("/{}", p), Some(q.to_string())),
                None => (format!("/{}", abs), None),
            };
            resolved.path = path;
            resolved.query = query;
        } else {
            // Relative reference: replace the last path segment.
            let base = match self.path.rfind('/') {
                Some(i) => &self.path[..=i],
                None => "/",
            };
            let (path, query) = match location.split_once('?') {
                Some((p, q)) => (format!("{}{}", base, p), Some(q.to_string())),
                None => (format!("{}{}", base, location), None),
            };
            resolved.path = path;
            resolved.query = query;
        }
        Ok(resolved)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.host_display())?;
        if self.port != self.scheme.default_port() {
            write!(f, ":{}", self.port)?;
        }
        write!(f, "{}", self.path)?;
        if let Some(q) = &self.query {
            write!(f, "?{}", q)?;
        }
        Ok(())
    }
}

/// Split host and optional port from an authority, handling [IPv6] literals.
fn split_host_port(authority: &str, default_port: u16) -> Result<(String, u16), HttpError> {
    // Userinfo is not part of this library's URL surface.
    if authority.contains('@') {
        return Err(HttpError::InvalidUrl("userinfo not supported".into()));
    }
    if let Some(rest) = authority.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| HttpError::InvalidUrl("unterminated IPv6 bracket".into()))?;
        let host = &rest[..end];
        let after = &rest[end + 1..];
        let port = if let Some(port_str) = after.strip_prefix(':') {
            port_str
                .parse::<u16>()
                .map_err(|_| HttpError::InvalidUrl(format!("invalid port: {}", port_str)))?
        } else if after.is_empty() {
            default_port
        } else {
            return Err(HttpError::InvalidUrl("garbage after IPv6 bracket".into()));
        };
        return Ok((host.to_string(), port));
    }
    match authority.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| HttpError::InvalidUrl(format!("invalid port: {}", port_str)))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), default_port)),
    }
}
