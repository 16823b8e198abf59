//! Content addressing using BLAKE3
//!
//! Shards and blocks are both named by the hash of their bytes, so
//! identical content always maps to the same identifier and re-adding
//! it is a no-op.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 256-bit content-addressed identifier
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

/// Identifier of a raw shard
pub type ShardId = ContentHash;

/// Identifier of a packaged block
pub type BlockId = ContentHash;

impl ContentHash {
    /// Compute the identifier for given data
    pub fn from_data(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self(*hash.as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}...)", &self.to_hex()[..8])
    }
}

/// Verify that data matches its claimed identifier
pub fn verify_content(id: &ContentHash, data: &[u8]) -> bool {
    ContentHash::from_data(data) == *id
}

/// Lowercase hex of `blake3(salt || data)`.
///
/// This is the answer a holder returns for a storage challenge and the
/// value the auditing side precomputes for each hour of a block's window.
pub fn salted_hash(salt: &[u8], data: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt);
    hasher.update(data);
    hasher.finalize().to_hex().to_string()
}
