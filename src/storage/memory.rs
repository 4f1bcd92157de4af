//! In-memory storage backend.

use crate::error::{Error, Result};
use crate::storage::traits::{KeyStream, StorageProvider, StorageRecord, chrono_duration};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Default interval between opportunistic sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Process-local storage backend.
///
/// A single lock guards the whole table. Expired entries are invisible to
/// reads immediately and are physically removed by a sweep that runs on
/// access once `sweep_interval` has passed.
#[derive(Debug)]
pub struct MemoryStore {
    table: Mutex<Table>,
    sweep_interval: chrono::Duration,
}

#[derive(Debug)]
struct Table {
    entries: HashMap<String, StorageRecord>,
    last_sweep: DateTime<Utc>,
}

impl Table {
    fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| !record.is_expired(now));
        self.last_sweep = now;
        before - self.entries.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that sweeps at most once per `interval`.
    #[must_use]
    pub fn with_sweep_interval(interval: Duration) -> Self {
        Self {
            table: Mutex::new(Table {
                entries: HashMap::new(),
                last_sweep: Utc::now(),
            }),
            sweep_interval: chrono_duration(interval),
        }
    }

    /// Number of physically stored entries, expired ones included.
    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.lock().map(|t| t.entries.len()).unwrap_or(0)
    }

    /// Lock the table, running the sweep if it is due.
    fn lock(&self) -> Result<MutexGuard<'_, Table>> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| Error::Unavailable("memory store lock poisoned".to_string()))?;
        let now = Utc::now();
        if now - table.last_sweep >= self.sweep_interval {
            let removed = table.sweep(now);
            if removed > 0 {
                debug!(removed, "Swept expired entries");
            }
        }
        Ok(table)
    }
}

#[async_trait]
impl StorageProvider for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let table = self.lock()?;
        let now = Utc::now();
        Ok(table
            .entries
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut table = self.lock()?;
        table
            .entries
            .insert(key.to_string(), StorageRecord::new(value, ttl, Utc::now()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut table = self.lock()?;
        table.entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<KeyStream> {
        let table = self.lock()?;
        let now = Utc::now();
        let mut keys: Vec<String> = table
            .entries
            .iter()
            .filter(|(key, record)| key.starts_with(prefix) && !record.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        drop(table);

        keys.sort();
        Ok(stream::iter(keys.into_iter().map(Ok)).boxed())
    }

    async fn sweep(&self) -> Result<usize> {
        let mut table = self.lock()?;
        Ok(table.sweep(Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::sync::Arc;

    async fn keys(store: &MemoryStore, prefix: &str) -> Vec<String> {
        store
            .list(prefix)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn get_missing_key() {
        let store = MemoryStore::new();
        assert!(store.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_and_get() {
        let store = MemoryStore::new();
        store.set("k", "v1", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v1"));

        store.set("k", "v2", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_nonexistent_key_succeeds() {
        let store = MemoryStore::new();
        store.delete("nonexistent").await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryStore::new();
        store.set("workflow:b", "1", None).await.unwrap();
        store.set("workflow:a", "1", None).await.unwrap();
        store.set("data:a:x", "1", None).await.unwrap();

        assert_eq!(keys(&store, "workflow:").await, vec!["workflow:a", "workflow:b"]);
        assert_eq!(keys(&store, "").await.len(), 3);
    }

    #[tokio::test]
    async fn list_can_be_called_repeatedly() {
        let store = MemoryStore::new();
        store.set("a", "1", None).await.unwrap();
        assert_eq!(keys(&store, "").await, keys(&store, "").await);
    }

    #[tokio::test]
    async fn expired_entry_hidden_before_sweep() {
        // Sweep interval far in the future: only the read-time check applies.
        let store = MemoryStore::with_sweep_interval(Duration::from_secs(3600));
        store
            .set("short", "v", Some(Duration::from_millis(30)))
            .await
            .unwrap();
        store.set("long", "v", None).await.unwrap();

        assert!(store.get("short").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(store.get("short").await.unwrap().is_none());
        assert_eq!(keys(&store, "").await, vec!["long"]);
        assert_eq!(store.raw_len(), 2);
    }

    #[tokio::test]
    async fn explicit_sweep_removes_expired() {
        let store = MemoryStore::with_sweep_interval(Duration::from_secs(3600));
        store
            .set("short", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        store.set("long", "v", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.sweep().await.unwrap(), 1);
        assert_eq!(store.raw_len(), 1);
    }

    #[tokio::test]
    async fn opportunistic_sweep_on_access() {
        let store = MemoryStore::with_sweep_interval(Duration::ZERO);
        store
            .set("short", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        store.get("anything").await.unwrap();
        assert_eq!(store.raw_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes() {
        let store = Arc::new(MemoryStore::new());

        let mut handles = vec![];
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for j in 0..10 {
                    store
                        .set(&format!("concurrent-{i}-{j}"), "v", None)
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task panicked");
        }

        assert_eq!(keys(&store, "concurrent-").await.len(), 100);
    }
}
