/*
 * pool.rs
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

//! Connection pool keyed by (scheme, host, port): per-key idle lists with
//! staleness and lifetime eviction, per-host and global caps. All
//! operations run under one mutex; dialing happens outside the lock via an
//! acquire permit.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, trace};

use crate::config::PoolConfig;
use crate::error::HttpError;
use crate::protocol::http::connection::{Connection, PoolKey};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub active: usize,
}

/// Result of `acquire`: a parked connection, or permission to dial a new
/// one (the slot is reserved; call `release` or `discard` to give it back).
pub enum Acquired {
    Reused(Connection),
    Permit,
}

struct Inner {
    idle: HashMap<PoolKey, Vec<Connection>>,
    active: HashMap<PoolKey, usize>,
    total_active: usize,
    next_id: u64,
}

impl Inner {
    fn idle_count(&self) -> usize {
        self.idle.values().map(|v| v.len()).sum()
    }

    fn per_host_count(&self, key: &PoolKey) -> usize {
        self.active.get(key).copied().unwrap_or(0)
            + self.idle.get(key).map(|v| v.len()).unwrap_or(0)
    }
}

pub struct ConnectionPool {
    config: PoolConfig,
    keep_alive_enabled: bool,
    inner: Mutex<Inner>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig, keep_alive_enabled: bool) -> Self {
        Self {
            config,
            keep_alive_enabled,
            inner: Mutex::new(Inner {
                idle: HashMap::new(),
                active: HashMap::new(),
                total_active: 0,
                next_id: 1,
            }),
        }
    }

    /// Connection ids are handed out by the pool so log lines correlate.
    pub fn next_id(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    /// Evict stale entries, then hand out the newest idle connection for
    /// the key, or a permit to dial if the caps allow a new one.
    pub fn acquire(&self, key: &PoolKey) -> Result<Acquired, HttpError> {
        let mut inner = self.inner.lock().unwrap();
        self.evict_stale(&mut inner);

        if let Some(list) = inner.idle.get_mut(key) {
            if let Some(conn) = list.pop() {
                trace!(conn = conn.id, key = %key, "reusing pooled connection");
                *inner.active.entry(key.clone()).or_insert(0) += 1;
                inner.total_active += 1;
                return Ok(Acquired::Reused(conn));
            }
        }

        if inner.per_host_count(key) >= self.config.max_per_host {
            return Err(HttpError::TooManyConnectionsForHost);
        }
        if inner.total_active + inner.idle_count() >= self.config.max_total {
            return Err(HttpError::PoolExhausted);
        }
        *inner.active.entry(key.clone()).or_insert(0) += 1;
        inner.total_active += 1;
        Ok(Acquired::Permit)
    }

    /// Return a connection after use. Destroyed unless keep-alive applies
    /// and the connection is still sound.
    pub fn release(&self, mut conn: Connection, keep_alive: bool) {
        let key = conn.key().clone();
        let mut inner = self.inner.lock().unwrap();
        if let Some(n) = inner.active.get_mut(&key) {
            *n = n.saturating_sub(1);
        }
        inner.total_active = inner.total_active.saturating_sub(1);

        let park = keep_alive && self.keep_alive_enabled && conn.is_reusable();
        if !park {
            debug!(conn = conn.id, key = %key, "closing connection");
            return; // dropped here
        }
        conn.mark_idle();
        let list = inner.idle.entry(key).or_default();
        list.push(conn);
        // Idle overflow beyond the per-host cap drops the oldest.
        while list.len() > self.config.max_per_host {
            list.remove(0);
        }
    }

    /// Give back a permit after a failed dial.
    pub fn discard(&self, key: &PoolKey) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(n) = inner.active.get_mut(key) {
            *n = n.saturating_sub(1);
        }
        inner.total_active = inner.total_active.saturating_sub(1);
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().unwrap();
        let idle = inner.idle_count();
        PoolStats {
            total: idle + inner.total_active,
            idle,
            active: inner.total_active,
        }
    }

    fn evict_stale(&self, inner: &mut Inner) {
        let idle_timeout = self.config.idle_timeout;
        let max_lifetime = self.config.max_lifetime;
        for list in inner.idle.values_mut() {
            list.retain(|conn| {
                let stale = conn.idle_for() > idle_timeout
                    || max_lifetime.map(|max| conn.age() > max).unwrap_or(false);
                if stale {
                    debug!(conn = conn.id, "evicting stale idle connection");
                }
                !stale
            });
        }
        inner.idle.retain(|_, list| !list.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::connection::{HttpStream, Transport};
    use crate::url::Scheme;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    fn key() -> PoolKey {
        PoolKey {
            scheme: Scheme::Http,
            host: "localhost".into(),
            port: 8080,
        }
    }

    async fn connection(pool: &ConnectionPool, key: &PoolKey) -> Connection {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (server, _) = listener.accept().await.unwrap();
            // Keep the server half open for the duration of the test.
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(server);
        });
        let client = TcpStream::connect(addr).await.unwrap();
        drop(accept);
        let mut conn = Connection::new(pool.next_id(), key.clone(), Transport::H1(HttpStream::Plain(client)));
        conn.begin_use();
        conn
    }

    fn pool(max_per_host: usize, max_total: usize, keep_alive: bool) -> ConnectionPool {
        ConnectionPool::new(
            PoolConfig {
                max_per_host,
                max_total,
                idle_timeout: Duration::from_secs(90),
                max_lifetime: None,
            },
            keep_alive,
        )
    }

    #[tokio::test]
    async fn acquire_release_cycle_reuses() {
        let pool = pool(10, 100, true);
        let k = key();
        assert!(matches!(pool.acquire(&k).unwrap(), Acquired::Permit));
        let conn = connection(&pool, &k).await;
        let id = conn.id;
        pool.release(conn, true);
        assert_eq!(pool.stats(), PoolStats { total: 1, idle: 1, active: 0 });

        match pool.acquire(&k).unwrap() {
            Acquired::Reused(c) => assert_eq!(c.id, id),
            Acquired::Permit => panic!("expected reuse"),
        }
        assert_eq!(pool.stats(), PoolStats { total: 1, idle: 0, active: 1 });
    }

    #[tokio::test]
    async fn keep_alive_disabled_destroys_on_release() {
        let pool = pool(10, 100, false);
        let k = key();
        let _ = pool.acquire(&k).unwrap();
        let conn = connection(&pool, &k).await;
        pool.release(conn, true);
        assert_eq!(pool.stats(), PoolStats { total: 0, idle: 0, active: 0 });
    }

    #[tokio::test]
    async fn closing_connection_not_parked() {
        let pool = pool(10, 100, true);
        let k = key();
        let _ = pool.acquire(&k).unwrap();
        let mut conn = connection(&pool, &k).await;
        conn.mark_closing();
        pool.release(conn, true);
        assert_eq!(pool.stats().idle, 0);
    }

    #[tokio::test]
    async fn per_host_cap_enforced() {
        let pool = pool(2, 100, true);
        let k = key();
        assert!(matches!(pool.acquire(&k).unwrap(), Acquired::Permit));
        assert!(matches!(pool.acquire(&k).unwrap(), Acquired::Permit));
        assert!(matches!(
            pool.acquire(&k),
            Err(HttpError::TooManyConnectionsForHost)
        ));
        // Failed dial releases the slot.
        pool.discard(&k);
        assert!(matches!(pool.acquire(&k).unwrap(), Acquired::Permit));
    }

    #[tokio::test]
    async fn global_cap_enforced() {
        let pool = pool(10, 2, true);
        let a = key();
        let b = PoolKey { port: 9090, ..key() };
        let c = PoolKey { port: 9091, ..key() };
        assert!(matches!(pool.acquire(&a).unwrap(), Acquired::Permit));
        assert!(matches!(pool.acquire(&b).unwrap(), Acquired::Permit));
        assert!(matches!(pool.acquire(&c), Err(HttpError::PoolExhausted)));
    }

    #[tokio::test]
    async fn stale_idle_connections_evicted_on_acquire() {
        let pool = ConnectionPool::new(
            PoolConfig {
                max_per_host: 10,
                max_total: 100,
                idle_timeout: Duration::from_millis(10),
                max_lifetime: None,
            },
            true,
        );
        let k = key();
        let _ = pool.acquire(&k).unwrap();
        let conn = connection(&pool, &k).await;
        pool.release(conn, true);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(pool.acquire(&k).unwrap(), Acquired::Permit));
        assert_eq!(pool.stats().idle, 0);
    }

    #[tokio::test]
    async fn max_lifetime_evicts_aged_connections() {
        let pool = ConnectionPool::new(
            PoolConfig {
                max_per_host: 10,
                max_total: 100,
                idle_timeout: Duration::from_secs(90),
                max_lifetime: Some(Duration::from_millis(10)),
            },
            true,
        );
        let k = key();
        let _ = pool.acquire(&k).unwrap();
        let conn = connection(&pool, &k).await;
        pool.release(conn, true);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(pool.acquire(&k).unwrap(), Acquired::Permit));
    }
}
