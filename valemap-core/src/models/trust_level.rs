use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Confidence level assigned to one direction of a relationship.
///
/// Levels map to the 0-3 wire scores used by the remote `trust_scores`
/// column: 3 = high, 2 = medium, 1 = low, 0 = unscored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    High,
    Medium,
    Low,
    Unscored,
}

impl TrustLevel {
    /// Numeric wire score (0-3).
    pub fn score(&self) -> u8 {
        match self {
            TrustLevel::High => 3,
            TrustLevel::Medium => 2,
            TrustLevel::Low => 1,
            TrustLevel::Unscored => 0,
        }
    }

    /// Level for a wire score. Anything outside 1-3 is unscored.
    pub fn from_score(score: u8) -> Self {
        match score {
            3 => TrustLevel::High,
            2 => TrustLevel::Medium,
            1 => TrustLevel::Low,
            _ => TrustLevel::Unscored,
        }
    }

    /// Next level in the score-cycle order used by the tap-to-cycle UI:
    /// unscored -> high -> medium -> low -> unscored.
    pub fn cycled(&self) -> Self {
        match self {
            TrustLevel::Unscored => TrustLevel::High,
            TrustLevel::High => TrustLevel::Medium,
            TrustLevel::Medium => TrustLevel::Low,
            TrustLevel::Low => TrustLevel::Unscored,
        }
    }
}

impl Default for TrustLevel {
    fn default() -> Self {
        TrustLevel::Unscored
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustLevel::High => write!(f, "high"),
            TrustLevel::Medium => write!(f, "medium"),
            TrustLevel::Low => write!(f, "low"),
            TrustLevel::Unscored => write!(f, "unscored"),
        }
    }
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(TrustLevel::High),
            "medium" => Ok(TrustLevel::Medium),
            "low" => Ok(TrustLevel::Low),
            "unscored" => Ok(TrustLevel::Unscored),
            _ => Err(format!(
                "Invalid trust level '{}'. Valid options: high, medium, low, unscored",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_level_display() {
        assert_eq!(format!("{}", TrustLevel::High), "high");
        assert_eq!(format!("{}", TrustLevel::Unscored), "unscored");
    }

    #[test]
    fn test_trust_level_from_str() {
        assert_eq!(TrustLevel::from_str("high").unwrap(), TrustLevel::High);
        assert_eq!(TrustLevel::from_str("MEDIUM").unwrap(), TrustLevel::Medium);
        assert_eq!(TrustLevel::from_str("Low").unwrap(), TrustLevel::Low);
        assert!(TrustLevel::from_str("extreme").is_err());
    }

    #[test]
    fn test_score_roundtrip() {
        for level in [
            TrustLevel::High,
            TrustLevel::Medium,
            TrustLevel::Low,
            TrustLevel::Unscored,
        ] {
            assert_eq!(TrustLevel::from_score(level.score()), level);
        }
    }

    #[test]
    fn test_out_of_range_score_is_unscored() {
        assert_eq!(TrustLevel::from_score(4), TrustLevel::Unscored);
        assert_eq!(TrustLevel::from_score(255), TrustLevel::Unscored);
    }

    #[test]
    fn test_json_roundtrip() {
        let json = serde_json::to_string(&TrustLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
        let parsed: TrustLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TrustLevel::High);
    }
}
