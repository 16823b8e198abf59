//! Block packaging
//!
//! Turns a set of shards into one compressed, encrypted block for a peer.

pub mod compression;
mod packager;

pub use packager::{BlockPackager, PackageError};
