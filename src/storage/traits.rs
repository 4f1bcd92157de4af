//! Storage trait definitions.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lazy, finite sequence of keys returned by [`StorageProvider::list`].
///
/// Each call produces a fresh stream; a consumed stream cannot be restarted.
pub type KeyStream = BoxStream<'static, Result<String>>;

/// Key-value storage backend with optional per-entry expiry.
///
/// `get` reports a missing (or expired) key as `Ok(None)`. A backend that
/// cannot be reached must return [`Error::Unavailable`](crate::Error::Unavailable)
/// so callers can reject the request instead of defaulting.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any existing value.
    ///
    /// A `ttl` of `None` means the entry never expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Delete `key`. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List live keys starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be started. Failures while
    /// the stream is consumed are yielded as stream items.
    async fn list(&self, prefix: &str) -> Result<KeyStream>;

    /// Remove expired entries, returning how many were removed.
    ///
    /// Backends that expire entries natively keep the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable.
    async fn sweep(&self) -> Result<usize> {
        Ok(0)
    }
}

/// A stored value with its absolute expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRecord {
    /// Stored value.
    pub value: String,

    /// When the entry stops being visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StorageRecord {
    /// Create a record expiring `ttl` after `now`.
    ///
    /// A TTL too large to represent is treated as no expiry.
    #[must_use]
    pub fn new(value: &str, ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.and_then(|ttl| now.checked_add_signed(chrono_duration(ttl))),
        }
    }

    /// Whether the record is past its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Convert a std duration, saturating instead of overflowing.
pub(crate) fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
