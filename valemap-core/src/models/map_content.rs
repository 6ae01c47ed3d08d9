use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::relationship::{Relationship, RelationshipRecord, ScorePair};
use super::session::Session;
use super::trust_level::TrustLevel;

/// The snapshot payload shape shared by version history entries and remote
/// map rows: sanitized relationship records plus a score map keyed by
/// relationship id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MapContent {
    #[serde(default)]
    pub relationships: Vec<RelationshipRecord>,
    #[serde(default)]
    pub trust_scores: HashMap<String, ScorePair>,
}

impl MapContent {
    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    /// Flatten a session into the snapshot shape.
    pub fn from_session(session: &Session) -> Self {
        let relationships = session
            .relationships
            .iter()
            .map(|r| RelationshipRecord {
                id: r.id.clone(),
                name: r.name.clone(),
            })
            .collect();

        let trust_scores = session
            .relationships
            .iter()
            .map(|r| {
                (
                    r.id.clone(),
                    ScorePair::new(r.outbound.score(), r.inbound.score()),
                )
            })
            .collect();

        Self {
            relationships,
            trust_scores,
        }
    }

    /// Rebuild full relationship nodes from the snapshot shape. Records
    /// without a score entry come back unscored.
    pub fn to_relationships(&self) -> Vec<Relationship> {
        self.relationships
            .iter()
            .map(|rec| {
                let scores = self.trust_scores.get(&rec.id).copied().unwrap_or_default();
                Relationship::new(rec.id.clone(), rec.name.clone()).with_scores(
                    TrustLevel::from_score(scores.outward),
                    TrustLevel::from_score(scores.inward),
                )
            })
            .collect()
    }
}
