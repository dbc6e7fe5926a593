/*
 * zero_rtt.rs
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

//! 0-RTT session-ticket cache, keyed by authority. Early data is only ever
//! offered for replay-safe methods; on server reject the caller falls back
//! to a 1-RTT stream.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use tracing::trace;

use crate::protocol::http::request::Method;

/// A resumption ticket captured from a prior session.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub ticket: Vec<u8>,
    /// Early-data budget the server advertised with the ticket.
    pub max_early_data: u32,
    pub expires_at: SystemTime,
}

impl SessionTicket {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// authority -> ticket. One ticket per authority; storing replaces.
#[derive(Debug, Default)]
pub struct ZeroRttCache {
    entries: HashMap<String, SessionTicket>,
}

impl ZeroRttCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn store(
        &mut self,
        authority: impl Into<String>,
        ticket: Vec<u8>,
        max_early_data: u32,
        lifetime: Duration,
    ) {
        let authority = authority.into();
        trace!(authority = %authority, max_early_data, "caching session ticket");
        self.entries.insert(
            authority,
            SessionTicket {
                ticket,
                max_early_data,
                expires_at: SystemTime::now() + lifetime,
            },
        );
    }

    /// The unexpired ticket for an authority, if any.
    pub fn lookup(&self, authority: &str) -> Option<&SessionTicket> {
        self.entries
            .get(authority)
            .filter(|t| !t.is_expired(SystemTime::now()))
    }

    /// Remove and return a ticket (e.g. after the server rejected early
    /// data, so the retry does a full handshake).
    pub fn take(&mut self, authority: &str) -> Option<SessionTicket> {
        self.entries.remove(authority)
    }

    /// A request may use 0-RTT only when its method is replay-safe
    /// (GET/HEAD/OPTIONS) and an unexpired ticket exists for the authority.
    pub fn can_use_0rtt(&self, method: Method, authority: &str) -> bool {
        let replay_safe = matches!(method, Method::Get | Method::Head | Method::Options);
        replay_safe && self.lookup(authority).is_some()
    }

    pub fn purge_expired(&mut self) {
        let now = SystemTime::now();
        self.entries.retain(|_, t| !t.is_expired(now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn replay_safe_methods_only() {
        let mut cache = ZeroRttCache::new();
        cache.store("example.com", vec![1, 2, 3], 16_384, HOUR);
        assert!(cache.can_use_0rtt(Method::Get, "example.com"));
        assert!(cache.can_use_0rtt(Method::Head, "example.com"));
        assert!(cache.can_use_0rtt(Method::Options, "example.com"));
        assert!(!cache.can_use_0rtt(Method::Post, "example.com"));
        assert!(!cache.can_use_0rtt(Method::Put, "example.com"));
        assert!(!cache.can_use_0rtt(Method::Delete, "example.com"));
    }

    #[test]
    fn unknown_authority_has_no_ticket() {
        let cache = ZeroRttCache::new();
        assert!(!cache.can_use_0rtt(Method::Get, "nowhere.example"));
        assert!(cache.lookup("nowhere.example").is_none());
    }

    #[test]
    fn expired_ticket_is_ignored_and_purged() {
        let mut cache = ZeroRttCache::new();
        cache.store("old.example", vec![9], 1024, Duration::ZERO);
        cache.store("fresh.example", vec![1], 1024, HOUR);
        assert!(!cache.can_use_0rtt(Method::Get, "old.example"));
        assert!(cache.can_use_0rtt(Method::Get, "fresh.example"));
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn take_removes_for_1rtt_fallback() {
        let mut cache = ZeroRttCache::new();
        cache.store("example.com", vec![1], 1024, HOUR);
        let ticket = cache.take("example.com").unwrap();
        assert_eq!(ticket.ticket, vec![1]);
        assert!(!cache.can_use_0rtt(Method::Get, "example.com"));
    }

    #[test]
    fn store_replaces_previous_ticket() {
        let mut cache = ZeroRttCache::new();
        cache.store("example.com", vec![1], 1024, HOUR);
        cache.store("example.com", vec![2], 2048, HOUR);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("example.com").unwrap().ticket, vec![2]);
        assert_eq!(cache.lookup("example.com").unwrap().max_early_data, 2048);
    }
}
