//! Block packager
//!
//! Aggregates shards into a single transport unit. Each shard is stored
//! either zstd-compressed or raw, whichever is smaller, and the whole
//! package carries a random salt so that two blocks with identical shard
//! sets still produce distinct block ids and ciphertexts.
//!
//! Wire form: bincode `{ salt, shards }` with shards ordered by id, then
//! sealed with XChaCha20-Poly1305 under a content-derived nonce.

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use super::compression;
use crate::config::PackagingConfig;
use crate::crypto::{self, BlockId, BlockKey, ContentHash, OsSaltSource, SaltSource, ShardId};
use crate::snapshot::{self, SnapshotError};

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Shard not found: {0}")]
    NotFound(ShardId),
    #[error("Corrupt package: {0}")]
    Corrupt(String),
    #[error("Package encoding failed: {0}")]
    Encode(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct StoredShard {
    compressed: bool,
    data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Package {
    salt: Vec<u8>,
    shards: BTreeMap<ShardId, StoredShard>,
}

/// In-memory builder and reader for one block
#[derive(Clone, Debug)]
pub struct BlockPackager {
    package: Package,
    compression_level: i32,
}

impl BlockPackager {
    /// Empty package with an OS-random salt
    pub fn new(config: &PackagingConfig) -> Self {
        Self::with_salt_source(config, &OsSaltSource)
    }

    pub fn with_salt_source(config: &PackagingConfig, salts: &dyn SaltSource) -> Self {
        Self {
            package: Package {
                salt: salts.salt(config.salt_len),
                shards: BTreeMap::new(),
            },
            compression_level: config.compression_level,
        }
    }

    /// Add a shard produced locally, returning the number of bytes kept
    ///
    /// Compression is attempted and kept only when strictly smaller.
    pub fn add_local_shard(&mut self, hash: ShardId, raw: &[u8]) -> usize {
        let packed = compression::pack(raw, self.compression_level);
        let stored_size = packed.data.len();

        debug!(
            "Packaged shard {} ({} -> {} bytes, compressed: {})",
            hash,
            raw.len(),
            stored_size,
            packed.compressed
        );

        self.package.shards.insert(
            hash,
            StoredShard {
                compressed: packed.compressed,
                data: packed.data,
            },
        );

        stored_size
    }

    /// Original bytes of a shard
    pub fn get_shard(&self, hash: &ShardId) -> Result<Vec<u8>, PackageError> {
        let stored = self
            .package
            .shards
            .get(hash)
            .ok_or(PackageError::NotFound(*hash))?;

        if !stored.compressed {
            return Ok(stored.data.clone());
        }

        compression::unpack(&stored.data)
            .map_err(|e| PackageError::Corrupt(format!("shard {} does not decompress: {}", hash, e)))
    }

    pub fn contains(&self, hash: &ShardId) -> bool {
        self.package.shards.contains_key(hash)
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.package.shards.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.package.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.package.shards.is_empty()
    }

    /// Bytes held across all shards, after compression
    pub fn stored_size(&self) -> usize {
        self.package.shards.values().map(|s| s.data.len()).sum()
    }

    pub fn salt(&self) -> &[u8] {
        &self.package.salt
    }

    /// Packaged payload before encryption
    ///
    /// Deterministic for identical salt and shard contents.
    pub fn serialize(&self) -> Result<Vec<u8>, PackageError> {
        snapshot::codec()
            .serialize(&self.package)
            .map_err(|e| PackageError::Encode(e.to_string()))
    }

    /// Content hash of the packaged payload
    pub fn block_id(&self) -> Result<BlockId, PackageError> {
        Ok(ContentHash::from_data(&self.serialize()?))
    }

    /// Packaged payload sealed with `key`
    ///
    /// Deterministic for identical salt, shard contents and key, so a
    /// re-packaged block keeps its ledger id.
    pub fn serialize_encrypted(&self, key: &BlockKey) -> Result<Vec<u8>, PackageError> {
        let plain = self.serialize()?;
        crypto::seal_deterministic(key, &plain).map_err(|e| PackageError::Encode(e.to_string()))
    }

    /// Open a block received from a peer
    ///
    /// A wrong key, tampered ciphertext and a malformed payload all surface
    /// as [`PackageError::Corrupt`].
    pub fn from_encrypted_bytes(
        bytes: &[u8],
        key: &BlockKey,
        config: &PackagingConfig,
    ) -> Result<Self, PackageError> {
        let plain = crypto::decrypt(key, bytes).map_err(|e| {
            warn!("Rejecting block: {}", e);
            PackageError::Corrupt(e.to_string())
        })?;

        let package: Package = snapshot::codec().deserialize(&plain).map_err(|e| {
            warn!("Rejecting block with malformed payload: {}", e);
            PackageError::Corrupt(e.to_string())
        })?;

        Ok(Self {
            package,
            compression_level: config.compression_level,
        })
    }

    /// Rebuild from a payload written by [`BlockPackager::serialize`]
    pub fn deserialize(bytes: &[u8], config: &PackagingConfig) -> Result<Self, SnapshotError> {
        let package: Package = snapshot::codec()
            .deserialize(bytes)
            .map_err(|e| SnapshotError::MalformedState(e.to_string()))?;

        Ok(Self {
            package,
            compression_level: config.compression_level,
        })
    }
}
