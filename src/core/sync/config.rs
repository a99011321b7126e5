/*!
 * Lock Configuration
 *
 * Runtime selection of the admission policy
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Admission order between readers and writers
///
/// Both policies rule out indefinite starvation in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FairnessPolicy {
    /// Readers that arrive while a writer waits queue behind it until that
    /// writer has released; readers queued ahead of a writer still go first.
    #[default]
    WriterPreferring,
    /// Strict arrival order; consecutive readers are admitted together
    Fifo,
}

impl FairnessPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            FairnessPolicy::WriterPreferring => "writer_preferring",
            FairnessPolicy::Fifo => "fifo",
        }
    }
}

impl fmt::Display for FairnessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FairnessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "writer" | "writer_preferring" | "writer-preferring" => {
                Ok(FairnessPolicy::WriterPreferring)
            }
            "fifo" => Ok(FairnessPolicy::Fifo),
            other => Err(format!("unknown fairness policy '{}' (expected writer or fifo)", other)),
        }
    }
}

/// Lock configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Admission policy
    pub policy: FairnessPolicy,
    /// Record acquisition statistics
    pub collect_stats: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::writer_preferring()
    }
}

impl LockConfig {
    /// Arrival-ordered writer preference (default)
    pub const fn writer_preferring() -> Self {
        Self {
            policy: FairnessPolicy::WriterPreferring,
            collect_stats: true,
        }
    }

    /// Strict arrival order
    pub const fn fifo() -> Self {
        Self {
            policy: FairnessPolicy::Fifo,
            collect_stats: true,
        }
    }

    pub const fn without_stats(mut self) -> Self {
        self.collect_stats = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("writer".parse(), Ok(FairnessPolicy::WriterPreferring));
        assert_eq!(" FIFO ".parse(), Ok(FairnessPolicy::Fifo));
        assert!("lifo".parse::<FairnessPolicy>().is_err());
    }

    #[test]
    fn test_default_is_writer_preferring() {
        let config = LockConfig::default();
        assert_eq!(config.policy, FairnessPolicy::WriterPreferring);
        assert!(config.collect_stats);
        assert!(!LockConfig::fifo().without_stats().collect_stats);
    }
}
