//! Shared fixtures for unit tests

use libp2p::PeerId;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Mutex;

use crate::crypto::SaltSource;

/// Deterministic peer identity derived from a single byte
pub fn test_peer(n: u8) -> PeerId {
    let bytes = [n; 32];
    let key = libp2p::identity::ed25519::SecretKey::try_from_bytes(bytes).unwrap();
    let keypair = libp2p::identity::ed25519::Keypair::from(key);
    PeerId::from(libp2p::identity::PublicKey::from(keypair.public()))
}

/// Salt source replaying a seeded generator
pub struct SeededSalts(Mutex<StdRng>);

impl SeededSalts {
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl SaltSource for SeededSalts {
    fn fill(&self, buf: &mut [u8]) {
        self.0.lock().unwrap().fill_bytes(buf);
    }
}
