//! Storage backends for workflow and session data.

pub mod file;
pub mod keys;
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use redis::RedisStore;
pub use traits::{KeyStream, StorageProvider, StorageRecord};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use std::sync::Arc;

/// Open the storage provider selected by `config`.
///
/// # Errors
///
/// Returns an error if the backend cannot be initialized, or
/// [`Error::Config`](crate::Error::Config) if Redis is selected in a build
/// without the `redis-backend` feature.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn StorageProvider>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::with_sweep_interval(
            config.sweep_interval(),
        ))),
        StorageBackend::File => Ok(Arc::new(FileStore::new(&config.path)?)),
        #[cfg(feature = "redis-backend")]
        StorageBackend::Redis => Ok(Arc::new(RedisStore::connect(&config.redis).await?)),
        #[cfg(not(feature = "redis-backend"))]
        StorageBackend::Redis => Err(crate::Error::Config(
            "redis backend requires the `redis-backend` feature".to_string(),
        )),
    }
}
