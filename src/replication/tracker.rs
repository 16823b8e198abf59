//! Replication tracker
//!
//! Knows which peers hold each shard and how many more copies its priority
//! class calls for. Shortfalls are recomputed from the holder sets on every
//! query, never cached.

use dashmap::DashMap;
use libp2p::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

use super::priority::{Priority, ReplicationTargets};
use crate::crypto::ShardId;
use crate::snapshot::{self, SnapshotError};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReplicationError {
    #[error("Shard not registered: {0}")]
    NotFound(ShardId),
    #[error("Replica targets must not decrease with priority: {0:?}")]
    InvalidTargets(ReplicationTargets),
}

/// Priority and holders of one shard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationEntry {
    pub priority: Priority,
    pub holders: HashSet<PeerId>,
}

impl ReplicationEntry {
    fn new(priority: Priority) -> Self {
        Self {
            priority,
            holders: HashSet::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TrackerSnapshot {
    shards: BTreeMap<ShardId, ReplicationEntry>,
}

pub struct ReplicationTracker {
    shards: DashMap<ShardId, ReplicationEntry>,
    targets: ReplicationTargets,
}

impl ReplicationTracker {
    pub fn new(targets: ReplicationTargets) -> Result<Self, ReplicationError> {
        if !targets.is_monotone() {
            return Err(ReplicationError::InvalidTargets(targets));
        }
        Ok(Self {
            shards: DashMap::new(),
            targets,
        })
    }

    pub fn targets(&self) -> &ReplicationTargets {
        &self.targets
    }

    /// Register a shard, or upgrade its priority
    ///
    /// Requests to lower an existing shard's priority are ignored.
    pub fn register_shard(&self, shard: ShardId, priority: Priority) {
        self.shards
            .entry(shard)
            .and_modify(|entry| {
                if priority > entry.priority {
                    info!("Shard {} upgraded {} -> {}", shard, entry.priority, priority);
                    entry.priority = priority;
                }
            })
            .or_insert_with(|| {
                debug!("Tracking shard {} at {}", shard, priority);
                ReplicationEntry::new(priority)
            });
    }

    pub fn add_holder(&self, shard: &ShardId, peer: PeerId) -> Result<(), ReplicationError> {
        let mut entry = self
            .shards
            .get_mut(shard)
            .ok_or(ReplicationError::NotFound(*shard))?;
        entry.holders.insert(peer);
        Ok(())
    }

    pub fn remove_holder(&self, shard: &ShardId, peer: &PeerId) -> Result<(), ReplicationError> {
        let mut entry = self
            .shards
            .get_mut(shard)
            .ok_or(ReplicationError::NotFound(*shard))?;
        entry.holders.remove(peer);
        Ok(())
    }

    /// Record that `peer` reports holding `shard`, registering it at the
    /// lowest priority if we have never seen it
    pub fn adopt_holder(&self, shard: ShardId, peer: PeerId) {
        self.shards
            .entry(shard)
            .or_insert_with(|| {
                debug!("Adopting unknown shard {} reported by {}", shard, peer);
                ReplicationEntry::new(Priority::lowest())
            })
            .holders
            .insert(peer);
    }

    /// Drop `peer` from every holder set, returning how many it held
    pub fn remove_peer_everywhere(&self, peer: &PeerId) -> usize {
        let mut count = 0;
        for mut entry in self.shards.iter_mut() {
            if entry.holders.remove(peer) {
                count += 1;
            }
        }
        if count > 0 {
            info!("Peer {} dropped as holder of {} shards", peer, count);
        }
        count
    }

    fn shortfall(&self, entry: &ReplicationEntry) -> usize {
        self.targets
            .target(entry.priority)
            .saturating_sub(entry.holders.len())
    }

    /// How many more holders `shard` needs
    pub fn required_peers(&self, shard: &ShardId) -> Result<usize, ReplicationError> {
        self.shards
            .get(shard)
            .map(|entry| self.shortfall(&entry))
            .ok_or(ReplicationError::NotFound(*shard))
    }

    pub fn holders(&self, shard: &ShardId) -> Result<HashSet<PeerId>, ReplicationError> {
        self.shards
            .get(shard)
            .map(|entry| entry.holders.clone())
            .ok_or(ReplicationError::NotFound(*shard))
    }

    pub fn priority(&self, shard: &ShardId) -> Result<Priority, ReplicationError> {
        self.shards
            .get(shard)
            .map(|entry| entry.priority)
            .ok_or(ReplicationError::NotFound(*shard))
    }

    fn select(&self, keep: impl Fn(&ReplicationEntry) -> bool) -> HashSet<ShardId> {
        self.shards
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Shards short of their target
    pub fn shards_needing_peers(&self) -> HashSet<ShardId> {
        self.select(|entry| self.shortfall(entry) > 0)
    }

    /// Shards short of their target that `peer` does not already hold
    pub fn shards_needing_peers_excluding(&self, peer: &PeerId) -> HashSet<ShardId> {
        self.select(|entry| self.shortfall(entry) > 0 && !entry.holders.contains(peer))
    }

    /// Shards with at least one holder that are still short
    pub fn partially_deployed(&self) -> HashSet<ShardId> {
        self.select(|entry| !entry.holders.is_empty() && self.shortfall(entry) > 0)
    }

    /// Shards meeting their target
    pub fn fully_deployed(&self) -> HashSet<ShardId> {
        self.select(|entry| self.shortfall(entry) == 0)
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SnapshotError> {
        let shards = self
            .shards
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        snapshot::write(&TrackerSnapshot { shards })
    }

    pub fn deserialize(bytes: &[u8], targets: ReplicationTargets) -> Result<Self, SnapshotError> {
        let snapshot: TrackerSnapshot = snapshot::read(bytes)?;
        let tracker = Self::new(targets).map_err(|e| SnapshotError::MalformedState(e.to_string()))?;
        for (shard, entry) in snapshot.shards {
            tracker.shards.insert(shard, entry);
        }
        Ok(tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ContentHash;
    use crate::testing::test_peer;
    use std::sync::Arc;

    fn tracker() -> ReplicationTracker {
        ReplicationTracker::new(ReplicationTargets::default()).unwrap()
    }

    fn shard(name: &str) -> ShardId {
        ContentHash::from_data(name.as_bytes())
    }

    #[test]
    fn test_upgrade_and_ignored_downgrade() {
        let tracker = tracker();
        let x = shard("x");
        tracker.register_shard(x, Priority::Normal);
        for n in 1..=3 {
            tracker.add_holder(&x, test_peer(n)).unwrap();
        }

        assert!(tracker.fully_deployed().contains(&x));
        assert!(!tracker.shards_needing_peers().contains(&x));

        tracker.register_shard(x, Priority::Critical);
        assert!(tracker.shards_needing_peers().contains(&x));
        assert_eq!(tracker.required_peers(&x).unwrap(), 3);

        tracker.register_shard(x, Priority::Normal);
        assert_eq!(tracker.priority(&x).unwrap(), Priority::Critical);
        assert_eq!(tracker.required_peers(&x).unwrap(), 3);
    }

    #[test]
    fn test_unregistered_shard_not_found() {
        let tracker = tracker();
        let x = shard("x");
        assert_eq!(tracker.add_holder(&x, test_peer(1)), Err(ReplicationError::NotFound(x)));
        assert_eq!(tracker.remove_holder(&x, &test_peer(1)), Err(ReplicationError::NotFound(x)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_adopt_registers_at_lowest() {
        let tracker = tracker();
        let x = shard("reported");
        tracker.adopt_holder(x, test_peer(1));
        tracker.adopt_holder(x, test_peer(1));

        assert_eq!(tracker.priority(&x).unwrap(), Priority::Lax);
        assert_eq!(tracker.holders(&x).unwrap().len(), 1);
        assert!(tracker.fully_deployed().contains(&x));
    }

    #[test]
    fn test_deployment_sets() {
        let tracker = tracker();
        let none = shard("none");
        let some = shard("some");
        let done = shard("done");
        for s in [none, some, done] {
            tracker.register_shard(s, Priority::Normal);
        }
        tracker.add_holder(&some, test_peer(1)).unwrap();
        for n in 1..=3 {
            tracker.add_holder(&done, test_peer(n)).unwrap();
        }

        assert_eq!(tracker.shards_needing_peers(), HashSet::from([none, some]));
        assert_eq!(tracker.partially_deployed(), HashSet::from([some]));
        assert_eq!(tracker.fully_deployed(), HashSet::from([done]));
        assert_eq!(tracker.shards_needing_peers_excluding(&test_peer(1)), HashSet::from([none]));
        assert_eq!(tracker.shards_needing_peers_excluding(&test_peer(9)), HashSet::from([none, some]));
    }

    #[test]
    fn test_remove_holder_and_peer_departure() {
        let tracker = tracker();
        let a = shard("a");
        let b = shard("b");
        tracker.register_shard(a, Priority::Lax);
        tracker.register_shard(b, Priority::Lax);
        tracker.add_holder(&a, test_peer(1)).unwrap();
        tracker.add_holder(&b, test_peer(1)).unwrap();

        tracker.remove_holder(&a, &test_peer(1)).unwrap();
        tracker.remove_holder(&a, &test_peer(1)).unwrap();
        assert_eq!(tracker.required_peers(&a).unwrap(), 1);

        assert_eq!(tracker.remove_peer_everywhere(&test_peer(1)), 1);
        assert_eq!(tracker.shards_needing_peers(), HashSet::from([a, b]));
    }

    #[test]
    fn test_concurrent_add_holder() {
        let tracker = Arc::new(tracker());
        let x = shard("busy");
        tracker.register_shard(x, Priority::Critical);

        let handles: Vec<_> = (1..=6u8)
            .map(|n| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.add_holder(&x, test_peer(n)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.holders(&x).unwrap().len(), 6);
        assert!(tracker.fully_deployed().contains(&x));
    }

    #[test]
    fn test_invalid_targets_rejected() {
        let targets = ReplicationTargets {
            lax: 5,
            normal: 3,
            critical: 6,
        };
        assert!(matches!(
            ReplicationTracker::new(targets),
            Err(ReplicationError::InvalidTargets(_))
        ));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let tracker = tracker();
        let x = shard("x");
        tracker.register_shard(x, Priority::Critical);
        tracker.add_holder(&x, test_peer(4)).unwrap();

        let restored = ReplicationTracker::deserialize(&tracker.serialize().unwrap(), ReplicationTargets::default()).unwrap();
        assert_eq!(restored.priority(&x).unwrap(), Priority::Critical);
        assert_eq!(restored.holders(&x).unwrap(), HashSet::from([test_peer(4)]));

        assert!(ReplicationTracker::deserialize(b"nonsense", ReplicationTargets::default()).is_err());
    }
}
