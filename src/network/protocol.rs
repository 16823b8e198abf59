//! Messages exchanged with storage peers
//!
//! Framing is left to the transport; these are the payloads it carries.

use serde::{Deserialize, Serialize};

use crate::crypto::{BlockId, ShardId};

/// Discriminates the two halves of a storage audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceKind {
    /// Payload is the salt for the current hour
    Challenge,
    /// Payload is the holder's lowercase hex `hash(salt || block)`
    Response,
}

/// Audit payload for one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceMessage {
    pub block_id: BlockId,
    pub kind: EvidenceKind,
    pub payload: Vec<u8>,
}

impl EvidenceMessage {
    pub fn challenge(block_id: BlockId, salt: Vec<u8>) -> Self {
        Self {
            block_id,
            kind: EvidenceKind::Challenge,
            payload: salt,
        }
    }

    pub fn response(block_id: BlockId, hash_hex: String) -> Self {
        Self {
            block_id,
            kind: EvidenceKind::Response,
            payload: hash_hex.into_bytes(),
        }
    }
}

/// Requests sent to a peer by the orchestration layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Store an encrypted block
    StoreBlock { block_id: BlockId, data: Vec<u8> },
    /// Fetch a previously stored block back
    FetchBlock { block_id: BlockId },
    /// Drop a block we no longer need held
    DeleteBlock { block_id: BlockId },
    /// Storage audit
    Evidence(EvidenceMessage),
    /// Announce shards we hold on the peer's behalf
    HoldingShards { shard_ids: Vec<ShardId> },
}

/// Reply to a [`PeerMessage`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerReply {
    Ack,
    Block { block_id: BlockId, data: Vec<u8> },
    Evidence(EvidenceMessage),
    Refused { reason: String },
}
