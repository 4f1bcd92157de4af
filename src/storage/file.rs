//! File-based storage backend.

use crate::error::Result;
use crate::storage::traits::{KeyStream, StorageProvider, StorageRecord};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

/// File-based storage backend with atomic writes.
///
/// Each key is one JSON file named after the hex-encoded key, so any key
/// string maps to a safe file name and can be recovered from it.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

/// On-disk layout of one entry.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct FileRecord {
    key: String,
    #[serde(flatten)]
    record: StorageRecord,
}

impl FileStore {
    /// Create a new file store rooted at `base_dir`.
    ///
    /// Creates the `store` directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directory cannot be created.
    pub fn new(base_dir: &Path) -> Result<Self> {
        let dir = base_dir.join("store");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the file holding `key`.
    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(key)))
    }

    /// Read the record at `path`, treating a missing file as absent.
    async fn read_record(path: &Path) -> Result<Option<FileRecord>> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Decode the key encoded in a store file name.
    fn key_from_path(path: &Path) -> Option<String> {
        if path.extension().is_none_or(|e| e != "json") {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

#[async_trait]
impl StorageProvider for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        let Some(entry) = Self::read_record(&path).await? else {
            return Ok(None);
        };
        if entry.record.is_expired(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(entry.record.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let path = self.entry_path(key);
        // Unique temp name: concurrent writers of one key must not share it
        let temp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        let entry = FileRecord {
            key: key.to_string(),
            record: StorageRecord::new(value, ttl, Utc::now()),
        };
        fs::write(&temp, serde_json::to_vec(&entry)?).await?;

        // Atomic rename - prevents corruption if process crashes mid-write
        fs::rename(&temp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<KeyStream> {
        let entries = fs::read_dir(&self.dir).await?;
        let prefix = prefix.to_string();

        // Directory entries are read one at a time as the stream is polled.
        let keys = stream::unfold(Some(entries), move |entries| {
            let prefix = prefix.clone();
            async move {
                let mut entries = entries?;
                loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => return None,
                        Err(e) => return Some((Err(e.into()), None)),
                    };
                    let path = entry.path();
                    let Some(key) = Self::key_from_path(&path) else {
                        continue;
                    };
                    if !key.starts_with(&prefix) {
                        continue;
                    }
                    // Corrupted and expired files are skipped, not fatal
                    match Self::read_record(&path).await {
                        Ok(Some(record)) if !record.record.is_expired(Utc::now()) => {
                            return Some((Ok(key), Some(entries)));
                        }
                        Ok(_) => {}
                        Err(e) => warn!(path = %path.display(), "Skipping unreadable record: {e}"),
                    }
                }
            }
        });
        Ok(keys.boxed())
    }

    async fn sweep(&self) -> Result<usize> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let now = Utc::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if Self::key_from_path(&path).is_none() {
                continue;
            }
            if let Ok(Some(record)) = Self::read_record(&path).await {
                if record.record.is_expired(now) {
                    match fs::remove_file(&path).await {
                        Ok(()) => removed += 1,
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        Ok(removed)
    }
}

/// Get the default stagegate home directory.
///
/// Uses `STAGEGATE_HOME` environment variable if set, otherwise `~/.stagegate`.
#[must_use]
pub fn get_stagegate_home() -> PathBuf {
    if let Ok(home) = std::env::var("STAGEGATE_HOME") {
        PathBuf::from(home)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".stagegate")
    } else {
        PathBuf::from(".stagegate")
    }
}
