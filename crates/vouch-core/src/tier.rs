//! Risk tier classification for commands.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// How destructive a command is judged to be.
///
/// `Safe` commands bypass review entirely. Everything else requires a
/// quorum of approvals before execution:
///
/// | Tier | Approvals | Notes |
/// |------|-----------|-------|
/// | `safe` | 0 | executed directly by the requestor |
/// | `caution` | 1 | |
/// | `dangerous` | 1 | rollback-eligible |
/// | `critical` | 2 | short approval TTL |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// No review required.
    Safe,
    /// Low-risk but worth a second pair of eyes.
    Caution,
    /// Destructive; rollback capture applies where possible.
    Dangerous,
    /// Highly destructive; larger quorum, short approval TTL.
    Critical,
}

impl RiskTier {
    /// Stable wire name (snake_case).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Dangerous => "dangerous",
            Self::Critical => "critical",
        }
    }

    /// Whether commands of this tier need reviewer approval at all.
    #[must_use]
    pub const fn requires_review(self) -> bool {
        !matches!(self, Self::Safe)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Safe => 0,
            Self::Caution => 1,
            Self::Dangerous => 2,
            Self::Critical => 3,
        }
    }
}

/// Returns `true` when `a` is strictly more severe than `b`.
///
/// The ordering is total over {caution < dangerous < critical}, with
/// `safe` ranking below everything. `tier_higher(x, x)` is always false.
#[must_use]
pub const fn tier_higher(a: RiskTier, b: RiskTier) -> bool {
    a.rank() > b.rank()
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe" => Ok(Self::Safe),
            "caution" => Ok(Self::Caution),
            "dangerous" => Ok(Self::Dangerous),
            "critical" => Ok(Self::Critical),
            other => Err(CoreError::UnknownTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_higher_is_strict() {
        let tiers = [
            RiskTier::Safe,
            RiskTier::Caution,
            RiskTier::Dangerous,
            RiskTier::Critical,
        ];
        for t in tiers {
            assert!(!tier_higher(t, t), "tier_higher({t}, {t}) must be false");
        }
        for (i, a) in tiers.iter().enumerate() {
            for (j, b) in tiers.iter().enumerate() {
                if i != j {
                    // exactly one direction holds
                    assert!(tier_higher(*a, *b) ^ tier_higher(*b, *a));
                }
            }
        }
    }

    #[test]
    fn test_tier_ordering() {
        assert!(tier_higher(RiskTier::Critical, RiskTier::Dangerous));
        assert!(tier_higher(RiskTier::Critical, RiskTier::Caution));
        assert!(tier_higher(RiskTier::Dangerous, RiskTier::Caution));
        assert!(!tier_higher(RiskTier::Dangerous, RiskTier::Critical));
        assert!(!tier_higher(RiskTier::Caution, RiskTier::Critical));
        assert!(!tier_higher(RiskTier::Caution, RiskTier::Dangerous));
        assert!(tier_higher(RiskTier::Caution, RiskTier::Safe));
    }

    #[test]
    fn test_round_trip() {
        for t in [
            RiskTier::Safe,
            RiskTier::Caution,
            RiskTier::Dangerous,
            RiskTier::Critical,
        ] {
            assert_eq!(t.as_str().parse::<RiskTier>().unwrap(), t);
        }
        assert!("nuclear".parse::<RiskTier>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&RiskTier::Dangerous).unwrap();
        assert_eq!(json, "\"dangerous\"");
    }
}
