//! Local shard blob store using sled

use sled::{Db, Tree};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::crypto::{verify_content, ContentHash, ShardId};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Shard not found: {0}")]
    NotFound(ShardId),
    #[error("Storage full")]
    StorageFull,
    #[error("Shard content does not match id {0}")]
    ContentMismatch(ShardId),
}

/// Content-addressed shard storage
///
/// Reads are verified against the shard id, so a store never hands back
/// bytes that hash to something else.
pub trait ShardStore: Send + Sync {
    fn put(&self, id: &ShardId, data: &[u8]) -> Result<(), StorageError>;
    fn get(&self, id: &ShardId) -> Result<Vec<u8>, StorageError>;
    fn delete(&self, id: &ShardId) -> Result<(), StorageError>;
    fn list(&self) -> Result<Vec<ShardId>, StorageError>;
}

/// sled-backed [`ShardStore`] with a size cap
pub struct ChunkStore {
    #[allow(dead_code)]
    db: Db,
    shards: Tree,
    metadata: Tree,
    max_size_bytes: u64,
}

impl ChunkStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>, max_size_gb: u64) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let shards = db.open_tree("shards")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            shards,
            metadata,
            max_size_bytes: max_size_gb * 1024 * 1024 * 1024,
        })
    }

    pub fn has(&self, id: &ShardId) -> Result<bool, StorageError> {
        Ok(self.shards.contains_key(id.as_bytes())?)
    }

    /// Bytes held across all shards
    pub fn total_size(&self) -> Result<u64, StorageError> {
        let mut total = 0u64;
        for item in self.shards.iter() {
            let (_, value) = item?;
            total += value.len() as u64;
        }
        Ok(total)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Unix time a shard was written
    pub fn stored_at(&self, id: &ShardId) -> Result<Option<i64>, StorageError> {
        let key = format!("stored_at:{}", id);
        Ok(self.metadata.get(key.as_bytes())?.and_then(|v| {
            let bytes: [u8; 8] = v.as_ref().try_into().ok()?;
            Some(i64::from_le_bytes(bytes))
        }))
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.shards.flush()?;
        self.metadata.flush()?;
        Ok(())
    }
}

impl ShardStore for ChunkStore {
    fn put(&self, id: &ShardId, data: &[u8]) -> Result<(), StorageError> {
        if !verify_content(id, data) {
            info!("Shard id mismatch - rejecting");
            return Err(StorageError::ContentMismatch(*id));
        }

        if self.has(id)? {
            return Ok(());
        }

        let current_size = self.total_size()?;
        if current_size + data.len() as u64 > self.max_size_bytes {
            return Err(StorageError::StorageFull);
        }

        self.shards.insert(id.as_bytes(), data)?;

        let key = format!("stored_at:{}", id);
        let timestamp = chrono::Utc::now().timestamp();
        self.metadata.insert(key.as_bytes(), &timestamp.to_le_bytes())?;

        Ok(())
    }

    fn get(&self, id: &ShardId) -> Result<Vec<u8>, StorageError> {
        let data = self
            .shards
            .get(id.as_bytes())?
            .map(|v| v.to_vec())
            .ok_or(StorageError::NotFound(*id))?;

        if !verify_content(id, &data) {
            warn!("Shard {} failed verification on read", id);
            return Err(StorageError::ContentMismatch(*id));
        }
        Ok(data)
    }

    fn delete(&self, id: &ShardId) -> Result<(), StorageError> {
        self.shards.remove(id.as_bytes())?;
        let key = format!("stored_at:{}", id);
        self.metadata.remove(key.as_bytes())?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<ShardId>, StorageError> {
        let mut ids = Vec::new();
        for item in self.shards.iter() {
            let (key, _) = item?;
            if let Ok(bytes) = <[u8; 32]>::try_from(key.as_ref()) {
                ids.push(ContentHash::from_bytes(bytes));
            }
        }
        Ok(ids)
    }
}
