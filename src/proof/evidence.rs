//! Hourly evidence calendars
//!
//! While the payload is still at hand we precompute one (salt, expected
//! hash) pair per hour of the block's validity window. Every hour gets its
//! own salt, so answering one challenge reveals nothing about the next.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{salted_hash, SaltSource};

const SECS_PER_HOUR: i64 = 3600;

/// One hour's challenge and the answer we expect
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePair {
    pub salt: Vec<u8>,
    pub expected: String,
}

/// Challenge calendar for one block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    start: DateTime<Utc>,
    pairs: Vec<EvidencePair>,
}

impl Evidence {
    /// Build the calendar covering `now`'s hour through `valid_until`
    ///
    /// Always yields at least one pair, even when `valid_until` has passed,
    /// and never more than `max_hours + 1`.
    pub fn generate(
        payload: &[u8],
        now: DateTime<Utc>,
        valid_until: DateTime<Utc>,
        max_hours: u32,
        salt_len: usize,
        salts: &dyn SaltSource,
    ) -> Self {
        let start = floor_to_hour(now);
        let span = hours_between(start, valid_until).clamp(0, i64::from(max_hours)) as usize;

        let pairs = (0..=span)
            .map(|_| {
                let salt = salts.salt(salt_len);
                let expected = salted_hash(&salt, payload);
                EvidencePair { salt, expected }
            })
            .collect();

        Self { start, pairs }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Start of the last covered hour
    pub fn last_hour(&self) -> DateTime<Utc> {
        self.start + TimeDelta::hours(self.pairs.len() as i64 - 1)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Slot covering `at`, if inside the window
    pub fn index_at(&self, at: DateTime<Utc>) -> Option<usize> {
        let idx = hours_between(self.start, at);
        if idx < 0 || idx as usize >= self.pairs.len() {
            return None;
        }
        Some(idx as usize)
    }

    pub fn pair(&self, index: usize) -> Option<&EvidencePair> {
        self.pairs.get(index)
    }
}

/// Truncate to the top of the hour
pub fn floor_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(SECS_PER_HOUR), 0).unwrap_or(t)
}

/// Whole hours from `from` to `to`, rounded toward negative infinity
pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().div_euclid(SECS_PER_HOUR)
}
