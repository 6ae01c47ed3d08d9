use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use thiserror::Error;

use super::relationship::Relationship;
use super::trust_level::TrustLevel;
use crate::validate::{self, ValidationError};

/// Hard cap on relationships in one session.
pub const MAX_RELATIONSHIPS: usize = 25;
/// Workflow minimum before the map step is considered complete enough
/// to advance.
pub const MIN_RELATIONSHIPS: usize = 12;

/// Workflow stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Landing,
    Map,
    Complete,
}

impl Default for Step {
    fn default() -> Self {
        Step::Landing
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Landing => write!(f, "landing"),
            Step::Map => write!(f, "map"),
            Step::Complete => write!(f, "complete"),
        }
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "landing" => Ok(Step::Landing),
            "map" => Ok(Step::Map),
            "complete" => Ok(Step::Complete),
            _ => Err(format!(
                "Invalid step '{}'. Valid options: landing, map, complete",
                s
            )),
        }
    }
}

/// Errors from session mutations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("A relationship named '{0}' already exists")]
    DuplicateName(String),

    #[error("Session is limited to {MAX_RELATIONSHIPS} relationships")]
    TooManyRelationships,

    #[error("No relationship with id '{0}'")]
    UnknownRelationship(String),

    #[error("Need at least {MIN_RELATIONSHIPS} relationships to finish the map ({0} so far)")]
    BelowMinimum(usize),
}

/// The working state of one coaching session.
///
/// The session is always serializable to a flat JSON document, and is
/// mirrored to local storage by the persistence adapter after every
/// mutation. A session with no subject name and no relationships is
/// equivalent to "no session" and is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Session {
    #[serde(default)]
    pub subject_name: String,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub current_step: Step,
    /// Relationship id counter; rebuilt from content after restore.
    #[serde(skip)]
    next_id: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when there is nothing worth persisting.
    pub fn is_empty(&self) -> bool {
        self.subject_name.is_empty() && self.relationships.is_empty()
    }

    /// Whether the workflow minimum has been reached.
    pub fn can_advance(&self) -> bool {
        self.relationships.len() >= MIN_RELATIONSHIPS
    }

    /// Set or clear the hub label. Input is sanitized; an input that
    /// sanitizes to nothing clears the label.
    pub fn set_subject_name(&mut self, raw: &str) {
        self.subject_name = validate::sanitize_text(raw, validate::MAX_TITLE_LENGTH);
    }

    /// Add a relationship by display name.
    ///
    /// Rejects names that are empty after sanitization, case-insensitive
    /// duplicates of an existing name, and additions beyond the cap.
    /// Returns the new relationship's id.
    pub fn add_relationship(&mut self, raw_name: &str) -> Result<String, SessionError> {
        let name = validate::validate_name(raw_name)?;

        if self.relationships.len() >= MAX_RELATIONSHIPS {
            return Err(SessionError::TooManyRelationships);
        }
        if self.has_name(&name, None) {
            return Err(SessionError::DuplicateName(name));
        }

        let id = self.generate_id();
        self.relationships.push(Relationship::new(id.clone(), name));
        Ok(id)
    }

    /// Remove a relationship and all score/note bookkeeping keyed by its id.
    pub fn remove_relationship(&mut self, id: &str) -> Result<(), SessionError> {
        let len_before = self.relationships.len();
        self.relationships.retain(|r| r.id != id);
        if self.relationships.len() == len_before {
            return Err(SessionError::UnknownRelationship(id.to_string()));
        }
        Ok(())
    }

    /// Rename a relationship, with the same name rules as adding.
    pub fn rename_relationship(&mut self, id: &str, raw_name: &str) -> Result<(), SessionError> {
        let name = validate::validate_name(raw_name)?;
        if self.has_name(&name, Some(id)) {
            return Err(SessionError::DuplicateName(name));
        }
        let rel = self.relationship_mut(id)?;
        rel.name = name;
        Ok(())
    }

    pub fn set_outbound(&mut self, id: &str, level: TrustLevel) -> Result<(), SessionError> {
        self.relationship_mut(id)?.outbound = level;
        Ok(())
    }

    pub fn set_inbound(&mut self, id: &str, level: TrustLevel) -> Result<(), SessionError> {
        self.relationship_mut(id)?.inbound = level;
        Ok(())
    }

    /// Advance the outbound score one step in the tap-to-cycle order.
    pub fn cycle_outbound(&mut self, id: &str) -> Result<TrustLevel, SessionError> {
        let rel = self.relationship_mut(id)?;
        rel.outbound = rel.outbound.cycled();
        Ok(rel.outbound)
    }

    /// Advance the inbound score one step in the tap-to-cycle order.
    pub fn cycle_inbound(&mut self, id: &str) -> Result<TrustLevel, SessionError> {
        let rel = self.relationship_mut(id)?;
        rel.inbound = rel.inbound.cycled();
        Ok(rel.inbound)
    }

    /// Attach or clear a free-text note. Notes are stored trimmed and
    /// sanitized again on display.
    pub fn set_note(&mut self, id: &str, note: &str) -> Result<(), SessionError> {
        let rel = self.relationship_mut(id)?;
        let trimmed = note.trim();
        rel.note = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        Ok(())
    }

    pub fn set_step(&mut self, step: Step) {
        self.current_step = step;
    }

    /// Move to a workflow step, enforcing the minimum before the map is
    /// considered finished. Hydration paths that restore a stored step
    /// bypass this via [`set_step`](Self::set_step).
    pub fn advance_to(&mut self, step: Step) -> Result<(), SessionError> {
        if step == Step::Complete && !self.can_advance() {
            return Err(SessionError::BelowMinimum(self.relationships.len()));
        }
        self.current_step = step;
        Ok(())
    }

    /// Start fresh: drop everything and reset the id counter.
    pub fn clear(&mut self) {
        *self = Session::new();
    }

    /// Find a relationship id by display name, case-insensitively.
    pub fn find_by_name(&self, name: &str) -> Option<&Relationship> {
        let needle = name.trim().to_lowercase();
        self.relationships
            .iter()
            .find(|r| r.name.to_lowercase() == needle)
    }

    /// Replace the session with a demo/preset map. Mutually exclusive with
    /// resuming a stored session; lands directly on the map step.
    pub fn load_demo(&mut self, items: Vec<DemoItem>) {
        self.clear();
        for item in items {
            let id = self.generate_id();
            let mut rel =
                Relationship::new(id, item.name.trim().to_string()).with_scores(item.outbound, item.inbound);
            rel.note = item.note;
            self.relationships.push(rel);
        }
        self.current_step = Step::Map;
    }

    /// Continue the id counter past the ids already in the session.
    /// Called after hydrating from storage so new ids never collide.
    pub fn sync_id_counter(&mut self) {
        self.next_id = self.max_id_counter();
    }

    fn generate_id(&mut self) -> String {
        if self.next_id == 0 {
            self.next_id = self.max_id_counter();
        }
        self.next_id += 1;
        format!("rel-{}-{}", self.next_id, Utc::now().timestamp_millis())
    }

    // Parse the numeric counter out of a rel-N-timestamp id.
    fn max_id_counter(&self) -> u64 {
        self.relationships
            .iter()
            .filter_map(|r| r.id.split('-').nth(1))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
    }

    fn has_name(&self, name: &str, excluding_id: Option<&str>) -> bool {
        let needle = name.to_lowercase();
        self.relationships.iter().any(|r| {
            r.name.to_lowercase() == needle && excluding_id.map_or(true, |id| r.id != id)
        })
    }

    fn relationship_mut(&mut self, id: &str) -> Result<&mut Relationship, SessionError> {
        self.relationships
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SessionError::UnknownRelationship(id.to_string()))
    }
}

/// One entry of a demo/preset map.
#[derive(Debug, Clone)]
pub struct DemoItem {
    pub name: String,
    pub outbound: TrustLevel,
    pub inbound: TrustLevel,
    pub note: Option<String>,
}
