//! Peer transport seam and the audit round trip built on it

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libp2p::PeerId;
use thiserror::Error;
use tracing::{info, warn};

use super::protocol::{PeerMessage, PeerReply};
use crate::crypto::BlockId;
use crate::proof::{ProofError, ProofLedger};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peer {0} did not answer in time")]
    Timeout(PeerId),
    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: PeerId, reason: String },
}

/// Delivers one message to a peer and waits for its reply
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(&self, peer: PeerId, message: PeerMessage) -> Result<PeerReply, TransportError>;
}

/// Result of challenging a holder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Passed,
    Failed,
    Unreachable,
}

/// Challenge the holder of `block_id` for the hour covering `at`
///
/// Unknown blocks and hours outside the evidence window are errors; a
/// holder that answers wrongly or with something other than evidence
/// fails the audit.
pub async fn audit_block(
    ledger: &ProofLedger,
    transport: &dyn PeerTransport,
    block_id: &BlockId,
    at: DateTime<Utc>,
) -> Result<AuditOutcome, ProofError> {
    let challenge = ledger.challenge(block_id, at)?;
    let peer = ledger.assigned_peer(block_id).ok_or(ProofError::NotFound {
        block_id: *block_id,
        index: None,
    })?;

    let reply = match transport.send(peer, PeerMessage::Evidence(challenge)).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Audit of block {} not delivered: {}", block_id, e);
            return Ok(AuditOutcome::Unreachable);
        }
    };

    let passed = match reply {
        PeerReply::Evidence(response) if response.block_id == *block_id => {
            ledger.verify_response(&response, at)?
        }
        _ => false,
    };

    if passed {
        info!("Peer {} proved possession of block {}", peer, block_id);
        Ok(AuditOutcome::Passed)
    } else {
        warn!("Peer {} failed audit of block {}", peer, block_id);
        Ok(AuditOutcome::Failed)
    }
}
