//! zstd compression with raw fallback
//!
//! Compressed output is only kept when it is strictly smaller than the
//! input. Random or already-compressed shards are stored as-is.

use std::io;

/// Default zstd level for shard payloads
pub const DEFAULT_LEVEL: i32 = 3;

/// Shard bytes as kept inside a package
pub struct Packed {
    pub compressed: bool,
    pub data: Vec<u8>,
}

/// Compress `data`, falling back to the raw bytes when that is no smaller
/// or when the encoder fails.
pub fn pack(data: &[u8], level: i32) -> Packed {
    match zstd::encode_all(data, level) {
        Ok(compressed) if compressed.len() < data.len() => Packed {
            compressed: true,
            data: compressed,
        },
        _ => Packed {
            compressed: false,
            data: data.to_vec(),
        },
    }
}

pub fn unpack(data: &[u8]) -> io::Result<Vec<u8>> {
    zstd::decode_all(data)
}
