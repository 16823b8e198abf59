//! Random salt sources
//!
//! Packaging and evidence generation draw salts through this trait so that
//! tests can substitute a seeded generator.

use rand::rngs::OsRng;
use rand::RngCore;

/// A source of unpredictable salt bytes
pub trait SaltSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);

    fn salt(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf);
        buf
    }
}

/// Operating system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSaltSource;

impl SaltSource for OsSaltSource {
    fn fill(&self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}
