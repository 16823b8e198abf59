//! Crash-recovery snapshots
//!
//! Every stateful component can write itself out as bytes and be rebuilt
//! from them. The surrounding process decides when; nothing here touches
//! disk. Snapshots are bincode with a leading format version.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Upper bound on any decoded structure
const DECODE_LIMIT: u64 = 1 << 32;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Malformed state: {0}")]
    MalformedState(String),
    #[error("Snapshot encoding failed: {0}")]
    Encode(String),
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    body: T,
}

/// bincode configuration shared by snapshots and packaged blocks
pub(crate) fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(DECODE_LIMIT)
}

/// Serialize `body` inside a versioned envelope
pub(crate) fn write<T: Serialize>(body: &T) -> Result<Vec<u8>, SnapshotError> {
    let envelope = Envelope {
        version: SNAPSHOT_VERSION,
        body,
    };
    codec()
        .serialize(&envelope)
        .map_err(|e| SnapshotError::Encode(e.to_string()))
}

/// Parse a versioned envelope written by [`write`]
pub(crate) fn read<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SnapshotError> {
    let envelope: Envelope<T> = codec()
        .deserialize(bytes)
        .map_err(|e| SnapshotError::MalformedState(e.to_string()))?;

    if envelope.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::MalformedState(format!(
            "unsupported snapshot version {}",
            envelope.version
        )));
    }

    Ok(envelope.body)
}
