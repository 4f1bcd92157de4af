//! Redis storage backend.

use crate::config::RedisConfig;
use crate::error::{Error, Result};
use crate::storage::traits::{KeyStream, StorageProvider};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use redis::Client;
use redis::aio::ConnectionManager;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::info;

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 100;

/// Redis-backed storage provider.
///
/// Expiry is delegated to Redis (`PX`), so `sweep` keeps its default no-op.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the server cannot be reached.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        info!(url = %mask_redis_url(&config.url), "Connecting to Redis");

        let client = Client::open(config.url.as_str()).map_err(|e| Error::Config(e.to_string()))?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

/// Every Redis failure surfaces as an unreachable backend.
fn unavailable(e: redis::RedisError) -> Error {
    Error::Unavailable(format!("redis: {e}"))
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_pattern(prefix: &str) -> String {
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

/// Mask password in Redis URL for safe logging.
fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map_or(0, |p| p + 3);
            if colon_pos > scheme_end {
                return format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..]);
            }
        }
    }
    url.to_string()
}

/// Cursor state for a lazy `SCAN` listing.
struct ScanState {
    conn: ConnectionManager,
    pattern: String,
    strip: usize,
    cursor: u64,
    buffer: VecDeque<String>,
    done: bool,
}

#[async_trait]
impl StorageProvider for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.prefixed_key(key)).arg(value);
        if let Some(ttl) = ttl {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(millis);
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(unavailable)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<KeyStream> {
        let state = ScanState {
            conn: self.conn.clone(),
            pattern: escape_pattern(&self.prefixed_key(prefix)),
            strip: self.key_prefix.len(),
            cursor: 0,
            buffer: VecDeque::new(),
            done: false,
        };

        let keys = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(key) = state.buffer.pop_front() {
                    let key = key.get(state.strip..).unwrap_or_default().to_string();
                    return Some((Ok(key), state));
                }
                if state.done {
                    return None;
                }
                let page: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                    .arg(state.cursor)
                    .arg("MATCH")
                    .arg(&state.pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut state.conn)
                    .await;
                match page {
                    Ok((next, batch)) => {
                        state.cursor = next;
                        state.done = next == 0;
                        state.buffer.extend(batch);
                    }
                    Err(e) => {
                        state.done = true;
                        state.buffer.clear();
                        return Some((Err(unavailable(e)), state));
                    }
                }
            }
        });
        Ok(keys.boxed())
    }
}
