//! Peer-assisted encrypted backup
//!
//! Files are cut into content-addressed shards that are packed into
//! encrypted blocks and shipped to peers. This crate holds the pieces that
//! make untrusted peer storage usable:
//! - Shards are packed into compressed, encrypted blocks
//! - Hourly challenge calendars prove a peer still holds a block's exact bytes
//! - Replica targets per priority decide which shards still need peers
//! - Bilateral exchange contracts keep storage given and received in balance

pub mod config;
pub mod crypto;
pub mod exchange;
pub mod network;
pub mod packaging;
pub mod proof;
pub mod replication;
pub mod snapshot;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{BackupConfig, ExchangeConfig, PackagingConfig, ProofConfig, UploadConfig};
pub use crypto::{BlockId, BlockKey, ContentHash, MasterKey, ShardId};
pub use exchange::{ExchangeBook, ExchangeContract, ExchangeError};
pub use network::{EvidenceMessage, PeerTransport, UploadTrigger};
pub use packaging::{BlockPackager, PackageError};
pub use proof::{ProofError, ProofLedger};
pub use replication::{Priority, ReplicationError, ReplicationTargets, ReplicationTracker};
pub use snapshot::SnapshotError;
pub use storage::{ChunkStore, ShardStore};
