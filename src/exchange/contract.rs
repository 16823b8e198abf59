//! Bilateral storage contract with one peer
//!
//! `mine` holds the blocks we store for the peer, `theirs` the blocks the
//! peer stores for us. Either side may run ahead of the other by its slack,
//! which starts at a configured base and widens by one for every ten
//! blocks of the smaller side.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::crypto::BlockId;

/// Extra slack granted per this many blocks held on the smaller side
const SLACK_STEP: usize = 10;

/// Which half of the contract an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Blocks we store for the peer
    Mine,
    /// Blocks the peer stores for us
    Theirs,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Mine => f.write_str("mine"),
            Side::Theirs => f.write_str("theirs"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("No space on {side} side for block {block_id} (headroom {headroom})")]
    SpaceExhausted {
        block_id: BlockId,
        side: Side,
        headroom: i64,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeContract {
    mine: HashSet<BlockId>,
    theirs: HashSet<BlockId>,
    my_slack_base: u64,
    peer_slack_base: u64,
}

impl ExchangeContract {
    pub fn new(my_slack_base: u64, peer_slack_base: u64) -> Self {
        Self {
            my_slack_base,
            peer_slack_base,
            ..Default::default()
        }
    }

    pub fn mine(&self) -> &HashSet<BlockId> {
        &self.mine
    }

    pub fn theirs(&self) -> &HashSet<BlockId> {
        &self.theirs
    }

    pub fn my_slack_base(&self) -> u64 {
        self.my_slack_base
    }

    pub fn peer_slack_base(&self) -> u64 {
        self.peer_slack_base
    }

    pub fn set_my_slack_base(&mut self, base: u64) {
        self.my_slack_base = base;
    }

    pub fn set_peer_slack_base(&mut self, base: u64) {
        self.peer_slack_base = base;
    }

    /// Slack in `i128` so any `u64` base plus growth stays exact
    fn effective_slack(&self, base: u64) -> i128 {
        let grown = self.mine.len().min(self.theirs.len()) / SLACK_STEP;
        i128::from(base) + grown as i128
    }

    /// Unclamped room for one more block in `mine`
    fn my_headroom(&self) -> i128 {
        self.theirs.len() as i128 - self.mine.len() as i128 + self.effective_slack(self.my_slack_base)
    }

    /// Unclamped room for one more block in `theirs`
    fn their_headroom(&self) -> i128 {
        self.mine.len() as i128 - self.theirs.len() as i128 + self.effective_slack(self.peer_slack_base)
    }

    /// How many more blocks we are willing to store for the peer
    pub fn available_my_space(&self) -> u64 {
        clamp_space(self.my_headroom())
    }

    /// How many more blocks the peer may be asked to store for us
    pub fn available_their_space(&self) -> u64 {
        clamp_space(self.their_headroom())
    }

    /// Accept a block to store for the peer
    pub fn add_mine(&mut self, block_id: BlockId) -> Result<(), ExchangeError> {
        if self.mine.contains(&block_id) {
            return Ok(());
        }
        let headroom = self.my_headroom();
        if headroom < 1 {
            return Err(ExchangeError::SpaceExhausted {
                block_id,
                side: Side::Mine,
                headroom: deficit(headroom),
            });
        }
        self.mine.insert(block_id);
        Ok(())
    }

    /// Record a block the peer agreed to store for us
    pub fn add_theirs(&mut self, block_id: BlockId) -> Result<(), ExchangeError> {
        if self.theirs.contains(&block_id) {
            return Ok(());
        }
        let headroom = self.their_headroom();
        if headroom < 1 {
            return Err(ExchangeError::SpaceExhausted {
                block_id,
                side: Side::Theirs,
                headroom: deficit(headroom),
            });
        }
        self.theirs.insert(block_id);
        Ok(())
    }

    pub fn remove_mine(&mut self, block_id: &BlockId) {
        self.mine.remove(block_id);
    }

    pub fn remove_theirs(&mut self, block_id: &BlockId) {
        self.theirs.remove(block_id);
    }
}

fn clamp_space(headroom: i128) -> u64 {
    u64::try_from(headroom.max(0)).unwrap_or(u64::MAX)
}

/// Refused headroom is at most zero and bounded below by a set size
fn deficit(headroom: i128) -> i64 {
    i64::try_from(headroom).unwrap_or(i64::MIN)
}
