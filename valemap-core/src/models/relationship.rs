use serde::{Deserialize, Serialize};
use std::fmt;

use super::trust_level::TrustLevel;

/// One named node on a coaching map, with two independent directional
/// confidence scores. Insertion order in the session drives spoke placement,
/// so relationships carry no position of their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub outbound: TrustLevel,
    #[serde(default)]
    pub inbound: TrustLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Relationship {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            outbound: TrustLevel::Unscored,
            inbound: TrustLevel::Unscored,
            note: None,
        }
    }

    pub fn with_scores(mut self, outbound: TrustLevel, inbound: TrustLevel) -> Self {
        self.outbound = outbound;
        self.inbound = inbound;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (out: {}, in: {})",
            self.name, self.outbound, self.inbound
        )
    }
}

/// The slimmed-down relationship shape stored in snapshots and remote rows:
/// id plus sanitized name. Scores live in the companion score map keyed by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipRecord {
    pub id: String,
    pub name: String,
}

/// Directional score pair as stored on the wire (0-3 each).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScorePair {
    pub outward: u8,
    pub inward: u8,
}

impl ScorePair {
    pub fn new(outward: u8, inward: u8) -> Self {
        Self { outward, inward }
    }
}
