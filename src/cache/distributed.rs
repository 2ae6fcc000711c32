//! Distributed cache adapter backed by Redis.
//!
//! Uses blocking connections: a cache round trip is the only point where a
//! request waits on another process, so no async client is needed here.

use std::time::Duration;

use redis::Commands;

use super::error::CacheResult;
use super::pattern::{KeyNamespace, KeyPattern};
use super::CacheAdapter;

/// Redis-backed [`CacheAdapter`].
pub struct RedisCache {
    client: redis::Client,
    namespace: KeyNamespace,
}

impl RedisCache {
    /// Opens a client for `url` and verifies the server answers `PING`.
    pub fn connect(url: &str, namespace: KeyNamespace) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_connection()?;
        redis::cmd("PING").query::<String>(&mut conn)?;
        Ok(Self { client, namespace })
    }

    fn conn(&self) -> CacheResult<redis::Connection> {
        Ok(self.client.get_connection()?)
    }

    fn scan(&self, conn: &mut redis::Connection, glob: &str) -> CacheResult<Vec<String>> {
        let keys: Vec<String> = conn.scan_match::<_, String>(glob)?.collect();
        Ok(keys)
    }
}

impl CacheAdapter for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.conn()?.get(self.namespace.key(key))?)
    }

    fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn()?;
        let key = self.namespace.key(key);
        match ttl {
            // SETEX rejects zero, so round sub-second TTLs up.
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))?,
            None => conn.set::<_, _, ()>(key, value)?,
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        let removed: usize = self.conn()?.del(self.namespace.key(key))?;
        Ok(removed > 0)
    }

    fn delete_by_key_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let glob = KeyPattern::parse(pattern)?.to_glob(&self.namespace);
        let mut conn = self.conn()?;
        let keys = self.scan(&mut conn, &glob)?;
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(conn.del(keys)?)
    }

    fn clear(&self) -> CacheResult<()> {
        self.delete_by_key_pattern("*").map(|_| ())
    }

    fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.conn()?.exists(self.namespace.key(key))?)
    }

    fn get_multiple(&self, keys: &[&str]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let stored: Vec<String> = keys.iter().map(|k| self.namespace.key(k)).collect();
        let values: Vec<Option<String>> = redis::cmd("MGET").arg(&stored).query(&mut self.conn()?)?;
        Ok(values)
    }
}
