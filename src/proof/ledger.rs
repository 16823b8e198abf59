//! Storage-proof ledger
//!
//! Tracks every block we have handed to a peer together with its evidence
//! calendar. Auditing a holder means revealing the salt for the current
//! hour and comparing its answer against the precomputed hash, so the
//! payload itself can be discarded once the block is registered.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use libp2p::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::evidence::{floor_to_hour, hours_between, Evidence, EvidencePair};
use crate::config::ProofConfig;
use crate::crypto::{salted_hash, BlockId, ContentHash, OsSaltSource, SaltSource, ShardId};
use crate::network::{EvidenceKind, EvidenceMessage};
use crate::snapshot::{self, SnapshotError};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProofError {
    #[error("No evidence for block {block_id} at hour index {index:?}")]
    NotFound {
        block_id: BlockId,
        /// `None` when the block itself is unknown
        index: Option<i64>,
    },
}

/// Everything we remember about a block handed out for storage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockRecord {
    pub evidence: Evidence,
    pub assigned_peer: PeerId,
    pub shards: Vec<ShardId>,
    pub valid_until: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct LedgerSnapshot {
    blocks: BTreeMap<BlockId, BlockRecord>,
}

/// Concurrent map of block id to evidence and placement
pub struct ProofLedger {
    blocks: DashMap<BlockId, BlockRecord>,
    salts: Arc<dyn SaltSource>,
    salt_len: usize,
    max_window_hours: u32,
}

impl ProofLedger {
    pub fn new(config: &ProofConfig) -> Self {
        Self::with_salt_source(config, Arc::new(OsSaltSource))
    }

    pub fn with_salt_source(config: &ProofConfig, salts: Arc<dyn SaltSource>) -> Self {
        Self {
            blocks: DashMap::new(),
            salts,
            salt_len: config.salt_len,
            max_window_hours: config.max_window_hours,
        }
    }

    /// Register a block handed to `peer`, valid until `valid_until`
    pub fn add_block(
        &self,
        payload: &[u8],
        shards: Vec<ShardId>,
        peer: PeerId,
        valid_until: DateTime<Utc>,
    ) -> BlockId {
        self.add_block_at(Utc::now(), payload, shards, peer, valid_until)
    }

    /// [`ProofLedger::add_block`] with an explicit creation time
    ///
    /// Re-adding a payload that is already registered keeps the existing
    /// calendar.
    pub fn add_block_at(
        &self,
        now: DateTime<Utc>,
        payload: &[u8],
        shards: Vec<ShardId>,
        peer: PeerId,
        valid_until: DateTime<Utc>,
    ) -> BlockId {
        let block_id = ContentHash::from_data(payload);
        if self.blocks.contains_key(&block_id) {
            debug!("Block {} already in ledger", block_id);
            return block_id;
        }

        let evidence = Evidence::generate(
            payload,
            now,
            valid_until,
            self.max_window_hours,
            self.salt_len,
            self.salts.as_ref(),
        );
        if evidence.last_hour() < floor_to_hour(valid_until) {
            warn!(
                "Block {} valid until {} but challenges stop after {}",
                block_id,
                valid_until,
                evidence.last_hour()
            );
        }

        match self.blocks.entry(block_id) {
            Entry::Occupied(_) => debug!("Block {} already in ledger", block_id),
            Entry::Vacant(slot) => {
                let hours = evidence.len();
                slot.insert(BlockRecord {
                    evidence,
                    assigned_peer: peer,
                    shards,
                    valid_until,
                });
                info!("Block {} assigned to {} with {} hourly challenges", block_id, peer, hours);
            }
        }

        block_id
    }

    /// Salt to send a holder when auditing at `at`
    pub fn get_challenge_salt(&self, block_id: &BlockId, at: DateTime<Utc>) -> Result<Vec<u8>, ProofError> {
        self.with_pair(block_id, at, |pair| pair.salt.clone())
    }

    /// Whether `candidate` is exactly the expected answer for `at`
    pub fn confirm_hash(
        &self,
        block_id: &BlockId,
        at: DateTime<Utc>,
        candidate: &str,
    ) -> Result<bool, ProofError> {
        self.with_pair(block_id, at, |pair| pair.expected == candidate)
    }

    /// Challenge message for the hour covering `at`
    pub fn challenge(&self, block_id: &BlockId, at: DateTime<Utc>) -> Result<EvidenceMessage, ProofError> {
        let salt = self.get_challenge_salt(block_id, at)?;
        Ok(EvidenceMessage::challenge(*block_id, salt))
    }

    /// Check a holder's reply
    ///
    /// A reply of the wrong kind or with a non-UTF-8 payload is a failed
    /// audit, not an error.
    pub fn verify_response(&self, response: &EvidenceMessage, at: DateTime<Utc>) -> Result<bool, ProofError> {
        let candidate = match (response.kind, std::str::from_utf8(&response.payload)) {
            (EvidenceKind::Response, Ok(candidate)) => candidate,
            _ => {
                // Still surface NotFound for unknown blocks or hours.
                self.with_pair(&response.block_id, at, |_| ())?;
                return Ok(false);
            }
        };
        self.confirm_hash(&response.block_id, at, candidate)
    }

    fn with_pair<T>(
        &self,
        block_id: &BlockId,
        at: DateTime<Utc>,
        f: impl FnOnce(&EvidencePair) -> T,
    ) -> Result<T, ProofError> {
        let record = self.blocks.get(block_id).ok_or(ProofError::NotFound {
            block_id: *block_id,
            index: None,
        })?;

        let evidence = &record.evidence;
        let pair = evidence
            .index_at(at)
            .and_then(|idx| evidence.pair(idx))
            .ok_or(ProofError::NotFound {
                block_id: *block_id,
                index: Some(hours_between(evidence.start(), at)),
            })?;

        Ok(f(pair))
    }

    /// Forget a block; true if it was present
    pub fn remove_block(&self, block_id: &BlockId) -> bool {
        let removed = self.blocks.remove(block_id).is_some();
        if removed {
            debug!("Removed block {} from ledger", block_id);
        }
        removed
    }

    /// Drop every block not in `live`, returning how many went
    pub fn remove_all_except(&self, live: &HashSet<BlockId>) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|id, _| live.contains(id));
        let removed = before.saturating_sub(self.blocks.len());
        if removed > 0 {
            info!("Garbage-collected {} blocks from ledger", removed);
        }
        removed
    }

    pub fn contains(&self, block_id: &BlockId) -> bool {
        self.blocks.contains_key(block_id)
    }

    pub fn assigned_peer(&self, block_id: &BlockId) -> Option<PeerId> {
        self.blocks.get(block_id).map(|r| r.assigned_peer)
    }

    pub fn contained_shards(&self, block_id: &BlockId) -> Option<Vec<ShardId>> {
        self.blocks.get(block_id).map(|r| r.shards.clone())
    }

    pub fn valid_until(&self, block_id: &BlockId) -> Option<DateTime<Utc>> {
        self.blocks.get(block_id).map(|r| r.valid_until)
    }

    /// Blocks currently assigned to `peer`
    pub fn blocks_for_peer(&self, peer: &PeerId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|entry| entry.assigned_peer == *peer)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SnapshotError> {
        let blocks = self
            .blocks
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        snapshot::write(&LedgerSnapshot { blocks })
    }

    pub fn deserialize(bytes: &[u8], config: &ProofConfig) -> Result<Self, SnapshotError> {
        let snapshot: LedgerSnapshot = snapshot::read(bytes)?;
        let ledger = Self::new(config);
        for (id, record) in snapshot.blocks {
            if record.evidence.is_empty() {
                return Err(SnapshotError::MalformedState(format!(
                    "block {} has no evidence",
                    id
                )));
            }
            ledger.blocks.insert(id, record);
        }
        Ok(ledger)
    }
}

/// Holder side: answer a challenge over the bytes we store
pub fn answer_challenge(challenge: &EvidenceMessage, stored: &[u8]) -> EvidenceMessage {
    EvidenceMessage::response(
        challenge.block_id,
        salted_hash(&challenge.payload, stored),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_peer, SeededSalts};
    use chrono::{TimeDelta, TimeZone};

    fn ledger() -> ProofLedger {
        ProofLedger::with_salt_source(&ProofConfig::default(), Arc::new(SeededSalts::new(42)))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 10, 20, 0).unwrap()
    }

    #[test]
    fn test_window_bounds() {
        let ledger = ledger();
        let payload = b"block payload".to_vec();
        let id = ledger.add_block_at(now(), &payload, vec![], test_peer(1), now() + TimeDelta::hours(3));

        for offset in 0..=3 {
            let at = now() + TimeDelta::hours(offset);
            let salt = ledger.get_challenge_salt(&id, at).unwrap();
            let answer = salted_hash(&salt, &payload);
            assert!(ledger.confirm_hash(&id, at, &answer).unwrap(), "offset {}", offset);
        }

        for offset in [-1, 4] {
            let at = now() + TimeDelta::hours(offset);
            assert!(matches!(
                ledger.get_challenge_salt(&id, at),
                Err(ProofError::NotFound { index: Some(_), .. })
            ));
            assert!(matches!(
                ledger.confirm_hash(&id, at, "00"),
                Err(ProofError::NotFound { index: Some(_), .. })
            ));
        }
    }

    #[test]
    fn test_hash_comparison_is_exact() {
        let ledger = ledger();
        let payload = b"exact bytes".to_vec();
        let id = ledger.add_block_at(now(), &payload, vec![], test_peer(1), now() + TimeDelta::hours(1));

        let salt = ledger.get_challenge_salt(&id, now()).unwrap();
        let h = salted_hash(&salt, &payload);
        assert!(ledger.confirm_hash(&id, now(), &h).unwrap());
        assert!(!ledger.confirm_hash(&id, now(), &h.to_uppercase()).unwrap());
        assert!(!ledger.confirm_hash(&id, now(), &salted_hash(&salt, b"other bytes")).unwrap());
    }

    #[test]
    fn test_each_hour_needs_its_own_answer() {
        let ledger = ledger();
        let payload = b"payload".to_vec();
        let id = ledger.add_block_at(now(), &payload, vec![], test_peer(1), now() + TimeDelta::hours(2));

        let first = salted_hash(&ledger.get_challenge_salt(&id, now()).unwrap(), &payload);
        let later = now() + TimeDelta::hours(1);
        assert!(!ledger.confirm_hash(&id, later, &first).unwrap());
    }

    #[test]
    fn test_remove_all_except() {
        let ledger = ledger();
        let until = now() + TimeDelta::hours(1);
        let a = ledger.add_block_at(now(), b"a", vec![], test_peer(1), until);
        let b = ledger.add_block_at(now(), b"b", vec![], test_peer(2), until);

        let removed = ledger.remove_all_except(&HashSet::from([a]));
        assert_eq!(removed, 1);

        assert!(ledger.get_challenge_salt(&a, now()).is_ok());
        assert_eq!(
            ledger.get_challenge_salt(&b, now()),
            Err(ProofError::NotFound { block_id: b, index: None })
        );
        assert!(matches!(ledger.confirm_hash(&b, now(), "x"), Err(ProofError::NotFound { .. })));
        assert!(!ledger.remove_block(&b));
        assert!(ledger.remove_block(&a));
    }

    #[test]
    fn test_readd_is_idempotent() {
        let ledger = ledger();
        let until = now() + TimeDelta::hours(5);
        let id1 = ledger.add_block_at(now(), b"same", vec![], test_peer(1), until);
        let salt = ledger.get_challenge_salt(&id1, now()).unwrap();
        let id2 = ledger.add_block_at(now(), b"same", vec![], test_peer(1), until);

        assert_eq!(id1, id2);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get_challenge_salt(&id2, now()).unwrap(), salt);
    }

    #[test]
    fn test_concurrent_readd_keeps_one_calendar() {
        let ledger = ledger();
        let payload = b"raced block".to_vec();
        let until = now() + TimeDelta::hours(3);

        let ids: Vec<BlockId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (1..=8u8)
                .map(|n| {
                    let ledger = &ledger;
                    let payload = &payload;
                    scope.spawn(move || ledger.add_block_at(now(), payload, vec![], test_peer(n), until))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(ledger.len(), 1);
        let id = ids[0];
        let winner = ledger.assigned_peer(&id).unwrap();
        assert!((1..=8u8).any(|n| test_peer(n) == winner));

        let challenge = ledger.challenge(&id, now()).unwrap();
        assert!(ledger.verify_response(&answer_challenge(&challenge, &payload), now()).unwrap());
        assert_eq!(ledger.challenge(&id, now()).unwrap(), challenge);
    }

    #[test]
    fn test_window_capped_by_config() {
        let config = ProofConfig {
            max_window_hours: 2,
            ..ProofConfig::default()
        };
        let ledger = ProofLedger::with_salt_source(&config, Arc::new(SeededSalts::new(7)));
        let until = now() + TimeDelta::days(365 * 50);
        let id = ledger.add_block_at(now(), b"long lived", vec![], test_peer(1), until);

        assert!(ledger.get_challenge_salt(&id, now() + TimeDelta::hours(2)).is_ok());
        assert_eq!(
            ledger.get_challenge_salt(&id, now() + TimeDelta::hours(3)),
            Err(ProofError::NotFound { block_id: id, index: Some(3) })
        );
        assert_eq!(ledger.valid_until(&id), Some(until));
    }

    #[test]
    fn test_challenge_response_messages() {
        let ledger = ledger();
        let payload = b"held by peer".to_vec();
        let id = ledger.add_block_at(now(), &payload, vec![], test_peer(3), now() + TimeDelta::hours(2));

        let challenge = ledger.challenge(&id, now()).unwrap();
        assert_eq!(challenge.kind, EvidenceKind::Challenge);

        let honest = answer_challenge(&challenge, &payload);
        assert!(ledger.verify_response(&honest, now()).unwrap());

        let dishonest = answer_challenge(&challenge, b"lost it");
        assert!(!ledger.verify_response(&dishonest, now()).unwrap());

        assert!(!ledger.verify_response(&challenge, now()).unwrap());
    }

    #[test]
    fn test_placement_queries() {
        let ledger = ledger();
        let until = now() + TimeDelta::hours(1);
        let shard = ContentHash::from_data(b"shard");
        let a = ledger.add_block_at(now(), b"a", vec![shard], test_peer(1), until);
        ledger.add_block_at(now(), b"b", vec![], test_peer(2), until);

        assert_eq!(ledger.assigned_peer(&a), Some(test_peer(1)));
        assert_eq!(ledger.contained_shards(&a), Some(vec![shard]));
        assert_eq!(ledger.valid_until(&a), Some(until));
        assert_eq!(ledger.blocks_for_peer(&test_peer(1)), vec![a]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let config = ProofConfig::default();
        let ledger = ledger();
        let payload = b"persist me".to_vec();
        let id = ledger.add_block_at(now(), &payload, vec![], test_peer(1), now() + TimeDelta::hours(2));
        let salt = ledger.get_challenge_salt(&id, now()).unwrap();

        let restored = ProofLedger::deserialize(&ledger.serialize().unwrap(), &config).unwrap();
        assert_eq!(restored.get_challenge_salt(&id, now()).unwrap(), salt);
        assert!(restored
            .confirm_hash(&id, now(), &salted_hash(&salt, &payload))
            .unwrap());

        assert!(ProofLedger::deserialize(&[1, 2, 3], &config).is_err());
    }
}
