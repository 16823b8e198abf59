//! Exchange contracts for all peers
//!
//! Contracts are created on first interaction using the configured slack
//! bases. Each peer's contract is updated under its own map shard lock, so
//! admission checks and inserts for one peer are atomic.

use dashmap::DashMap;
use libp2p::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::contract::{ExchangeContract, ExchangeError};
use crate::config::ExchangeConfig;
use crate::crypto::BlockId;
use crate::snapshot::{self, SnapshotError};

#[derive(Serialize, Deserialize)]
struct BookSnapshot {
    contracts: BTreeMap<PeerId, ExchangeContract>,
}

pub struct ExchangeBook {
    contracts: DashMap<PeerId, ExchangeContract>,
    config: ExchangeConfig,
}

impl ExchangeBook {
    pub fn new(config: ExchangeConfig) -> Self {
        Self {
            contracts: DashMap::new(),
            config,
        }
    }

    fn fresh_contract(&self) -> ExchangeContract {
        ExchangeContract::new(self.config.my_slack_base, self.config.peer_slack_base)
    }

    fn update<T>(&self, peer: PeerId, f: impl FnOnce(&mut ExchangeContract) -> T) -> T {
        let mut contract = self
            .contracts
            .entry(peer)
            .or_insert_with(|| {
                debug!("Opening exchange contract with {}", peer);
                self.fresh_contract()
            });
        f(&mut contract)
    }

    fn read<T>(&self, peer: &PeerId, f: impl FnOnce(&ExchangeContract) -> T) -> T {
        match self.contracts.get(peer) {
            Some(contract) => f(&contract),
            None => f(&self.fresh_contract()),
        }
    }

    /// Agree to store `block_id` for `peer`
    pub fn add_mine(&self, peer: PeerId, block_id: BlockId) -> Result<(), ExchangeError> {
        self.update(peer, |c| c.add_mine(block_id)).inspect_err(|e| {
            warn!("Refusing to store for {}: {}", peer, e);
        })
    }

    /// Record that `peer` stores `block_id` for us
    pub fn add_theirs(&self, peer: PeerId, block_id: BlockId) -> Result<(), ExchangeError> {
        self.update(peer, |c| c.add_theirs(block_id)).inspect_err(|e| {
            debug!("Cannot place block with {}: {}", peer, e);
        })
    }

    pub fn remove_mine(&self, peer: &PeerId, block_id: &BlockId) {
        if let Some(mut contract) = self.contracts.get_mut(peer) {
            contract.remove_mine(block_id);
        }
    }

    pub fn remove_theirs(&self, peer: &PeerId, block_id: &BlockId) {
        if let Some(mut contract) = self.contracts.get_mut(peer) {
            contract.remove_theirs(block_id);
        }
    }

    pub fn set_slack_bases(&self, peer: PeerId, my_slack_base: u64, peer_slack_base: u64) {
        self.update(peer, |c| {
            c.set_my_slack_base(my_slack_base);
            c.set_peer_slack_base(peer_slack_base);
        });
    }

    pub fn available_my_space(&self, peer: &PeerId) -> u64 {
        self.read(peer, |c| c.available_my_space())
    }

    pub fn available_their_space(&self, peer: &PeerId) -> u64 {
        self.read(peer, |c| c.available_their_space())
    }

    /// Point-in-time copy of the contract with `peer`
    pub fn contract(&self, peer: &PeerId) -> ExchangeContract {
        self.read(peer, |c| c.clone())
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.contracts.iter().map(|entry| *entry.key()).collect()
    }

    /// Peers that would currently accept another block from us
    pub fn peers_with_their_space(&self) -> Vec<PeerId> {
        self.contracts
            .iter()
            .filter(|entry| entry.available_their_space() > 0)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SnapshotError> {
        let contracts = self
            .contracts
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        snapshot::write(&BookSnapshot { contracts })
    }

    pub fn deserialize(bytes: &[u8], config: ExchangeConfig) -> Result<Self, SnapshotError> {
        let snapshot: BookSnapshot = snapshot::read(bytes)?;
        let book = Self::new(config);
        for (peer, contract) in snapshot.contracts {
            book.contracts.insert(peer, contract);
        }
        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ContentHash;
    use crate::exchange::Side;
    use crate::testing::test_peer;
    use std::sync::Arc;

    fn block(name: &str) -> BlockId {
        ContentHash::from_data(name.as_bytes())
    }

    #[test]
    fn test_lazy_contracts_use_config() {
        let book = ExchangeBook::new(ExchangeConfig {
            my_slack_base: 2,
            peer_slack_base: 0,
        });
        let peer = test_peer(1);

        assert_eq!(book.available_my_space(&peer), 2);
        assert!(book.peers().is_empty());

        book.add_mine(peer, block("b1")).unwrap();
        assert_eq!(book.peers(), vec![peer]);
        assert_eq!(book.available_my_space(&peer), 1);
        assert_eq!(book.available_their_space(&peer), 1);
    }

    #[test]
    fn test_raising_slack_admits_theirs() {
        let book = ExchangeBook::new(ExchangeConfig::default());
        let peer = test_peer(2);

        assert!(matches!(
            book.add_theirs(peer, block("t1")),
            Err(ExchangeError::SpaceExhausted { side: Side::Theirs, .. })
        ));
        assert!(book.peers_with_their_space().is_empty());

        book.set_slack_bases(peer, 0, 1);
        assert_eq!(book.peers_with_their_space(), vec![peer]);
        book.add_theirs(peer, block("t1")).unwrap();
        assert!(book.contract(&peer).theirs().contains(&block("t1")));
    }

    #[test]
    fn test_peers_are_independent() {
        let book = ExchangeBook::new(ExchangeConfig {
            my_slack_base: 1,
            peer_slack_base: 0,
        });
        book.add_mine(test_peer(1), block("a")).unwrap();
        book.add_mine(test_peer(2), block("a")).unwrap();
        assert!(book.add_mine(test_peer(1), block("b")).is_err());
        book.remove_mine(&test_peer(1), &block("a"));
        book.add_mine(test_peer(1), block("b")).unwrap();
    }

    #[test]
    fn test_concurrent_admission_respects_slack() {
        let book = Arc::new(ExchangeBook::new(ExchangeConfig {
            my_slack_base: 3,
            peer_slack_base: 0,
        }));
        let peer = test_peer(5);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let book = Arc::clone(&book);
                std::thread::spawn(move || book.add_mine(peer, block(&format!("b{}", i))).is_ok())
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(accepted, 3);
        assert_eq!(book.contract(&peer).mine().len(), 3);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let book = ExchangeBook::new(ExchangeConfig {
            my_slack_base: 1,
            peer_slack_base: 1,
        });
        let peer = test_peer(3);
        book.add_mine(peer, block("m")).unwrap();
        book.add_theirs(peer, block("t")).unwrap();

        let restored = ExchangeBook::deserialize(&book.serialize().unwrap(), ExchangeConfig::default()).unwrap();
        assert_eq!(restored.contract(&peer), book.contract(&peer));
        assert!(ExchangeBook::deserialize(&[], ExchangeConfig::default()).is_err());
    }
}
