//! Redis-backed shared cache.
//!
//! Redis has no native compare-and-set, so compare operations run as Lua
//! scripts, which Redis executes atomically. `add` is `SET NX PX` and key
//! enumeration uses `SCAN MATCH`.

use super::SharedCache;
use crate::error::{LockError, Result};
use redis::{Client, Commands, Connection, RedisError, RedisResult, Script};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const BACKEND: &str = "cache";

const COMPARE_SET: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  if tonumber(ARGV[3]) > 0 then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
  else
    redis.call('SET', KEYS[1], ARGV[2])
  end
  return 1
end
return 0
";

const COMPARE_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
";

/// Shared cache on a Redis server.
pub struct RedisCache {
    url: String,
    client: Client,
    conn: Mutex<Option<Connection>>,
    compare_set: Script,
    compare_delete: Script,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache").field("url", &self.url).finish()
    }
}

impl RedisCache {
    /// Connect to the server at `url` (e.g. `redis://127.0.0.1/`).
    ///
    /// Fails with `BackendUnavailable` if the server cannot be reached now.
    pub fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| LockError::unavailable(BACKEND, e))?;
        let conn = client
            .get_connection()
            .map_err(|e| LockError::unavailable(BACKEND, format!("{}: {}", url, e)))?;

        Ok(Self {
            url: url.to_string(),
            client,
            conn: Mutex::new(Some(conn)),
            compare_set: Script::new(COMPARE_SET),
            compare_delete: Script::new(COMPARE_DELETE),
        })
    }

    /// Run `op` on the cached connection, reconnecting if the previous one
    /// was dropped after an I/O failure.
    fn with_conn<T>(&self, op: impl FnOnce(&mut Connection) -> RedisResult<T>) -> Result<T> {
        let mut slot = self.conn.lock().unwrap_or_else(|poison| poison.into_inner());

        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => {
                debug!(url = %self.url, "reconnecting to redis");
                self.client
                    .get_connection()
                    .map_err(|e| LockError::unavailable(BACKEND, e))?
            }
        };

        match op(&mut conn) {
            Ok(value) => {
                *slot = Some(conn);
                Ok(value)
            }
            Err(e) => {
                if !is_connection_failure(&e) {
                    *slot = Some(conn);
                }
                Err(LockError::unavailable(BACKEND, e))
            }
        }
    }
}

fn is_connection_failure(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal()
}

fn ttl_millis(ttl: Option<Duration>) -> u64 {
    ttl.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1))
        .unwrap_or(0)
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn glob_escape(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('*');
    out
}

impl SharedCache for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| conn.get(key))
    }

    fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        let millis = ttl_millis(ttl);
        if millis > 0 {
            cmd.arg("PX").arg(millis);
        }

        let reply: Option<String> = self.with_conn(|conn| cmd.query(conn))?;
        Ok(reply.is_some())
    }

    fn compare_set(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let swapped: i64 = self.with_conn(|conn| {
            self.compare_set
                .key(key)
                .arg(expected)
                .arg(new)
                .arg(ttl_millis(ttl))
                .invoke(conn)
        })?;
        Ok(swapped == 1)
    }

    fn compare_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let deleted: i64 = self.with_conn(|conn| {
            self.compare_delete.key(key).arg(expected).invoke(conn)
        })?;
        Ok(deleted > 0)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let deleted: i64 = self.with_conn(|conn| conn.del(key))?;
        Ok(deleted > 0)
    }

    fn keys(&self, prefix: &str) -> Result<Option<Vec<String>>> {
        let pattern = glob_escape(prefix);
        let mut keys: Vec<String> = self.with_conn(|conn| {
            let iter = conn.scan_match::<_, String>(&pattern)?;
            Ok(iter.collect())
        })?;
        keys.sort();
        keys.dedup();
        Ok(Some(keys))
    }
}
