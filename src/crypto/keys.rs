//! Key derivation and management using Argon2id
//!
//! A node derives one master key from the user's passphrase and from it a
//! distinct block key per storage relationship. The block key is the shared
//! secret both ends of that relationship use to seal and open blocks.

use argon2::{Algorithm, Argon2, Params, Version};
use libp2p::PeerId;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

/// Master key derived from user passphrase
/// Automatically zeroed when dropped
#[derive(ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; 32],
}

impl MasterKey {
    /// Derive a master key from a passphrase
    ///
    /// Uses Argon2id with memory-hard parameters to resist brute force
    pub fn derive_from_passphrase(
        passphrase: &str,
        salt: &[u8; 16],
    ) -> Result<Self, argon2::Error> {
        // Memory: 64 MiB, Iterations: 3, Parallelism: 4
        let params = Params::new(64 * 1024, 3, 4, Some(32))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; 32];
        argon2.hash_password_into(passphrase.as_bytes(), salt, &mut key)?;

        Ok(Self { key })
    }

    /// Generate a new random salt for key derivation
    pub fn generate_salt() -> [u8; 16] {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    /// Derive the block key used for everything exchanged with `peer`
    pub fn derive_block_key(&self, peer: &PeerId) -> BlockKey {
        let mut hasher = blake3::Hasher::new_derive_key("peer-backup block key v1");
        hasher.update(&self.key);
        hasher.update(&peer.to_bytes());

        let mut key = [0u8; 32];
        hasher.finalize_xof().fill(&mut key);

        BlockKey { key }
    }
}

/// Symmetric key sealing packaged blocks
#[derive(Clone, ZeroizeOnDrop)]
pub struct BlockKey {
    key: [u8; 32],
}

impl BlockKey {
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Fresh random key, for relationships not rooted in a passphrase
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}
