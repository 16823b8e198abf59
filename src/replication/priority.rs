//! Priority classes and their replica targets

use serde::{Deserialize, Serialize};
use std::fmt;

/// How hard we try to keep a shard off-site
///
/// Ordered: `Lax < Normal < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Lax,
    Normal,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Lax, Priority::Normal, Priority::Critical];

    pub fn lowest() -> Self {
        Priority::Lax
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Lax => "lax",
            Priority::Normal => "normal",
            Priority::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Number of peers each priority should be stored on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationTargets {
    pub lax: usize,
    pub normal: usize,
    pub critical: usize,
}

impl Default for ReplicationTargets {
    fn default() -> Self {
        Self {
            lax: 1,
            normal: 3,
            critical: 6,
        }
    }
}

impl ReplicationTargets {
    pub fn target(&self, priority: Priority) -> usize {
        match priority {
            Priority::Lax => self.lax,
            Priority::Normal => self.normal,
            Priority::Critical => self.critical,
        }
    }

    /// Higher priorities never ask for fewer replicas
    pub fn is_monotone(&self) -> bool {
        self.lax <= self.normal && self.normal <= self.critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(Priority::Lax < Priority::Normal);
        assert!(Priority::Normal < Priority::Critical);
        assert_eq!(Priority::lowest(), Priority::Lax);
    }

    #[test]
    fn test_default_targets() {
        let targets = ReplicationTargets::default();
        assert!(targets.is_monotone());
        assert_eq!(targets.target(Priority::Normal), 3);
        assert_eq!(targets.target(Priority::Critical), 6);
    }

    #[test]
    fn test_non_monotone_targets() {
        let targets = ReplicationTargets {
            lax: 4,
            normal: 2,
            critical: 6,
        };
        assert!(!targets.is_monotone());
    }
}
