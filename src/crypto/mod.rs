//! Cryptography module
//!
//! Provides content addressing, block encryption, key derivation and salt
//! generation.

pub mod encryption;
pub mod hashing;
pub mod keys;
pub mod salt;

pub use encryption::{decrypt, encrypt, seal_deterministic, EncryptionError};
pub use hashing::{salted_hash, verify_content, BlockId, ContentHash, ShardId};
pub use keys::{BlockKey, MasterKey};
pub use salt::{OsSaltSource, SaltSource};
