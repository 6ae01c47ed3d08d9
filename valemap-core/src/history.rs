//! Bounded version history for one map's content.
//!
//! Keeps a single linear timeline of at most [`MAX_VERSIONS`] snapshots,
//! oldest evicted first, with sequence numbers kept dense (1..count) after
//! any eviction or deletion. A version is never mutated once created, only
//! deleted wholesale. The log is persisted after every mutation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{MapContent, RelationshipRecord, ScorePair};
use crate::store::{LocalStore, StorageKey};
use crate::validate;

/// Most versions retained per map.
pub const MAX_VERSIONS: usize = 10;
/// Default interval between automatic snapshots.
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Application tag carried by exported history documents.
pub const EXPORT_APP_TAG: &str = "Valence Mapper";

/// Errors from version history operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Version {0} not found")]
    VersionNotFound(u32),

    #[error("Import document has no versions array")]
    InvalidImport,
}

/// An immutable snapshot of a map's content at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Version {
    pub sequence: u32,
    pub timestamp: DateTime<Utc>,
    pub change_summary: String,
    pub is_manual: bool,
    pub relationship_count: usize,
    pub content: MapContent,
}

/// Differences between two versions, keyed by relationship name (ids may
/// differ across snapshots taken at different times).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<ScoreChange>,
}

/// A score-pair change for a relationship present in both versions.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreChange {
    pub name: String,
    pub before: ScorePair,
    pub after: ScorePair,
}

/// Summary counters over the whole log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryStats {
    pub total_versions: usize,
    pub manual_saves: usize,
    pub auto_saves: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// The version history engine, persisted under the version-history key.
#[derive(Debug)]
pub struct VersionHistory {
    store: LocalStore,
    versions: Vec<Version>,
}

impl VersionHistory {
    /// Load the stored log, treating absent or corrupt data as empty.
    pub fn load(store: LocalStore) -> Self {
        let versions = store.read(StorageKey::VersionHistory).unwrap_or_default();
        Self { store, versions }
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn latest(&self) -> Option<&Version> {
        self.versions.last()
    }

    pub fn get(&self, sequence: u32) -> Option<&Version> {
        self.versions.iter().find(|v| v.sequence == sequence)
    }

    /// Create a snapshot of `content` and return it.
    ///
    /// The content is sanitized first. When no summary is supplied, one is
    /// derived by comparing relationship counts against the previous
    /// version. When the log is already at the cap, the oldest entry is
    /// evicted and the rest renumbered to stay dense from 1 before the new
    /// snapshot is appended.
    pub fn create_version(
        &mut self,
        content: &MapContent,
        summary: Option<String>,
        is_manual: bool,
    ) -> Version {
        let content = validate::sanitize_map_content(content);
        let change_summary =
            summary.unwrap_or_else(|| self.generate_summary(content.relationships.len()));

        if self.versions.len() >= MAX_VERSIONS {
            self.versions.remove(0);
            self.renumber();
        }

        let version = Version {
            sequence: self.latest().map_or(1, |v| v.sequence + 1),
            timestamp: Utc::now(),
            change_summary,
            is_manual,
            relationship_count: content.relationships.len(),
            content,
        };
        self.versions.push(version.clone());
        self.save();
        version
    }

    /// Return the stored content of an exact sequence number without
    /// touching the log. Whether to record a post-restore version is the
    /// caller's decision.
    pub fn restore_version(&self, sequence: u32) -> Result<MapContent, HistoryError> {
        self.get(sequence)
            .map(|v| v.content.clone())
            .ok_or(HistoryError::VersionNotFound(sequence))
    }

    /// Delete one version and renumber the remainder densely.
    pub fn delete_version(&mut self, sequence: u32) -> Result<(), HistoryError> {
        let index = self
            .versions
            .iter()
            .position(|v| v.sequence == sequence)
            .ok_or(HistoryError::VersionNotFound(sequence))?;
        self.versions.remove(index);
        self.renumber();
        self.save();
        Ok(())
    }

    /// Drop the whole log.
    pub fn clear_all(&mut self) {
        self.versions.clear();
        self.save();
    }

    /// Compare two versions by relationship name.
    ///
    /// Names in `b` but not `a` are added, names in `a` but not `b` are
    /// removed, and names in both with differing score pairs are modified.
    /// Read-only.
    pub fn compare_versions(&self, a: u32, b: u32) -> Result<VersionDiff, HistoryError> {
        let va = self.get(a).ok_or(HistoryError::VersionNotFound(a))?;
        let vb = self.get(b).ok_or(HistoryError::VersionNotFound(b))?;

        let mut diff = VersionDiff::default();

        for rel in &vb.content.relationships {
            if find_by_name(&va.content.relationships, &rel.name).is_none() {
                diff.added.push(rel.name.clone());
            }
        }

        for rel in &va.content.relationships {
            match find_by_name(&vb.content.relationships, &rel.name) {
                None => diff.removed.push(rel.name.clone()),
                Some(other) => {
                    let before = va.content.trust_scores.get(&rel.id);
                    let after = vb.content.trust_scores.get(&other.id);
                    if let (Some(&before), Some(&after)) = (before, after) {
                        if before != after {
                            diff.modified.push(ScoreChange {
                                name: rel.name.clone(),
                                before,
                                after,
                            });
                        }
                    }
                }
            }
        }

        Ok(diff)
    }

    /// Elapsed-time autosave predicate. The caller owns its "last save"
    /// marker and resets it after invoking `create_version`.
    pub fn should_autosave(last_save: DateTime<Utc>, interval: Duration) -> bool {
        let elapsed = Utc::now().signed_duration_since(last_save);
        elapsed.to_std().map_or(false, |e| e >= interval)
    }

    /// Round-trip the whole log as a single export document.
    pub fn export_all(&self) -> Value {
        serde_json::json!({
            "app_name": EXPORT_APP_TAG,
            "export_date": Utc::now(),
            "version_count": self.versions.len(),
            "versions": self.versions,
        })
    }

    /// Replace the log wholesale from an export document.
    ///
    /// Only the top-level shape is checked (an array under `versions`);
    /// entries are deliberately not re-validated, preserving the original
    /// import permissiveness.
    pub fn import_all(&mut self, doc: &Value) -> Result<usize, HistoryError> {
        let versions = doc
            .get("versions")
            .and_then(Value::as_array)
            .ok_or(HistoryError::InvalidImport)?;
        let versions: Vec<Version> = serde_json::from_value(Value::Array(versions.clone()))
            .map_err(|_| HistoryError::InvalidImport)?;
        self.versions = versions;
        self.save();
        Ok(self.versions.len())
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            total_versions: self.versions.len(),
            manual_saves: self.versions.iter().filter(|v| v.is_manual).count(),
            auto_saves: self.versions.iter().filter(|v| !v.is_manual).count(),
            oldest: self.versions.first().map(|v| v.timestamp),
            newest: self.versions.last().map(|v| v.timestamp),
        }
    }

    fn generate_summary(&self, count: usize) -> String {
        match self.latest() {
            None => format!("Initial version with {} relationship(s)", count),
            Some(prev) => {
                let prev_count = prev.relationship_count;
                if count > prev_count {
                    format!(
                        "Added {} relationship(s) (total: {})",
                        count - prev_count,
                        count
                    )
                } else if count < prev_count {
                    format!(
                        "Removed {} relationship(s) (total: {})",
                        prev_count - count,
                        count
                    )
                } else {
                    format!("Updated trust scores ({} relationships)", count)
                }
            }
        }
    }

    fn renumber(&mut self) {
        for (index, version) in self.versions.iter_mut().enumerate() {
            version.sequence = index as u32 + 1;
        }
    }

    // Persist the log; under storage pressure, trade history depth for a
    // successful write by evicting the oldest entry and retrying once.
    fn save(&mut self) {
        if let Err(e) = self.store.write(StorageKey::VersionHistory, &self.versions) {
            tracing::warn!("Version history write failed, evicting oldest: {}", e);
            if !self.versions.is_empty() {
                self.versions.remove(0);
                self.renumber();
                if let Err(e) = self.store.write(StorageKey::VersionHistory, &self.versions) {
                    tracing::warn!("Version history write failed after eviction: {}", e);
                }
            }
        }
    }
}

fn find_by_name<'a>(
    records: &'a [RelationshipRecord],
    name: &str,
) -> Option<&'a RelationshipRecord> {
    records.iter().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn test_history() -> (VersionHistory, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path().to_path_buf());
        (VersionHistory::load(store), temp_dir)
    }

    fn content(names: &[&str]) -> MapContent {
        content_scored(&names.iter().map(|n| (*n, 0u8, 0u8)).collect::<Vec<_>>())
    }

    fn content_scored(entries: &[(&str, u8, u8)]) -> MapContent {
        let relationships = entries
            .iter()
            .enumerate()
            .map(|(i, (name, _, _))| RelationshipRecord {
                id: format!("rel-{}-0", i + 1),
                name: name.to_string(),
            })
            .collect();
        let trust_scores = entries
            .iter()
            .enumerate()
            .map(|(i, (_, outward, inward))| {
                (format!("rel-{}-0", i + 1), ScorePair::new(*outward, *inward))
            })
            .collect::<HashMap<_, _>>();
        MapContent {
            relationships,
            trust_scores,
        }
    }

    #[test]
    fn test_first_version_summary() {
        let (mut history, _temp) = test_history();
        let v = history.create_version(&content(&["Kate"]), None, true);
        assert_eq!(v.sequence, 1);
        assert_eq!(v.change_summary, "Initial version with 1 relationship(s)");
        assert!(v.is_manual);
    }

    #[test]
    fn test_derived_summaries() {
        let (mut history, _temp) = test_history();
        history.create_version(&content(&["Kate"]), None, false);
        let v = history.create_version(&content(&["Kate", "Omar"]), None, false);
        assert_eq!(v.change_summary, "Added 1 relationship(s) (total: 2)");
        let v = history.create_version(&content(&["Kate"]), None, false);
        assert_eq!(v.change_summary, "Removed 1 relationship(s) (total: 1)");
        let v = history.create_version(&content(&["Kate"]), None, false);
        assert_eq!(v.change_summary, "Updated trust scores (1 relationships)");
    }

    #[test]
    fn test_explicit_summary_wins() {
        let (mut history, _temp) = test_history();
        let v = history.create_version(&content(&["Kate"]), Some("before review".into()), true);
        assert_eq!(v.change_summary, "before review");
    }

    #[test]
    fn test_eviction_keeps_sequences_dense() {
        let (mut history, _temp) = test_history();
        for i in 0..MAX_VERSIONS {
            history.create_version(&content(&[&format!("Person {}", i)]), None, false);
        }
        let second_oldest = history.get(2).unwrap().content.clone();

        history.create_version(&content(&["Newest"]), None, false);

        assert_eq!(history.versions().len(), MAX_VERSIONS);
        let sequences: Vec<u32> = history.versions().iter().map(|v| v.sequence).collect();
        assert_eq!(sequences, (1..=MAX_VERSIONS as u32).collect::<Vec<_>>());
        // What was entry #2 is entry #1 after eviction
        assert_eq!(history.get(1).unwrap().content, second_oldest);
    }

    #[test]
    fn test_restore_does_not_mutate_log() {
        let (mut history, _temp) = test_history();
        history.create_version(&content(&["Kate"]), None, false);
        history.create_version(&content(&["Kate", "Omar"]), None, false);

        let before: Vec<Version> = history.versions().to_vec();
        let restored = history.restore_version(1).unwrap();
        assert_eq!(restored.relationships[0].name, "Kate");
        assert_eq!(history.versions(), before.as_slice());

        assert_eq!(
            history.restore_version(99),
            Err(HistoryError::VersionNotFound(99))
        );
    }

    #[test]
    fn test_delete_renumbers() {
        let (mut history, _temp) = test_history();
        history.create_version(&content(&["A"]), None, false);
        history.create_version(&content(&["B"]), None, false);
        history.create_version(&content(&["C"]), None, false);

        history.delete_version(2).unwrap();
        assert_eq!(history.versions().len(), 2);
        assert_eq!(history.get(2).unwrap().content.relationships[0].name, "C");
    }

    #[test]
    fn test_compare_versions_antisymmetric() {
        let (mut history, _temp) = test_history();
        history.create_version(&content_scored(&[("Kate", 3, 2), ("Omar", 1, 1)]), None, false);
        history.create_version(&content_scored(&[("Kate", 2, 2), ("Priya", 0, 0)]), None, false);

        let forward = history.compare_versions(1, 2).unwrap();
        assert_eq!(forward.added, vec!["Priya"]);
        assert_eq!(forward.removed, vec!["Omar"]);
        assert_eq!(forward.modified.len(), 1);
        assert_eq!(forward.modified[0].name, "Kate");
        assert_eq!(forward.modified[0].before, ScorePair::new(3, 2));
        assert_eq!(forward.modified[0].after, ScorePair::new(2, 2));

        let backward = history.compare_versions(2, 1).unwrap();
        assert_eq!(backward.added, forward.removed);
        assert_eq!(backward.removed, forward.added);
    }

    #[test]
    fn test_should_autosave() {
        let now = Utc::now();
        let interval = Duration::from_millis(1000);
        assert!(VersionHistory::should_autosave(
            now - chrono::Duration::milliseconds(1500),
            interval
        ));
        assert!(!VersionHistory::should_autosave(
            now - chrono::Duration::milliseconds(500),
            interval
        ));
    }

    #[test]
    fn test_export_import_roundtrip() {
        let (mut history, _temp) = test_history();
        history.create_version(&content(&["Kate"]), None, true);
        history.create_version(&content(&["Kate", "Omar"]), None, false);

        let doc = history.export_all();
        assert_eq!(doc["app_name"], EXPORT_APP_TAG);
        assert_eq!(doc["version_count"], 2);

        let (mut other, _temp2) = test_history();
        let imported = other.import_all(&doc).unwrap();
        assert_eq!(imported, 2);
        assert_eq!(other.versions(), history.versions());
    }

    #[test]
    fn test_import_rejects_bad_shape() {
        let (mut history, _temp) = test_history();
        assert_eq!(
            history.import_all(&serde_json::json!({"nope": true})),
            Err(HistoryError::InvalidImport)
        );
        assert_eq!(
            history.import_all(&serde_json::json!({"versions": "not an array"})),
            Err(HistoryError::InvalidImport)
        );
    }

    #[test]
    fn test_create_sanitizes_content() {
        let (mut history, _temp) = test_history();
        let mut raw = content(&["<b>Kate</b>", "<><>"]);
        raw.trust_scores.insert("rel-1-0".into(), ScorePair::new(9, 2));
        let v = history.create_version(&raw, None, false);

        assert_eq!(v.relationship_count, 1);
        assert_eq!(v.content.relationships[0].name, "Kate");
        // Out-of-range score clamps to unscored
        assert_eq!(v.content.trust_scores["rel-1-0"], ScorePair::new(0, 2));
    }

    #[test]
    fn test_log_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path().to_path_buf());
        let mut history = VersionHistory::load(store.clone());
        history.create_version(&content(&["Kate"]), None, true);

        let reloaded = VersionHistory::load(store);
        assert_eq!(reloaded.versions().len(), 1);
    }

    #[test]
    fn test_stats() {
        let (mut history, _temp) = test_history();
        assert_eq!(history.stats().total_versions, 0);
        history.create_version(&content(&["Kate"]), None, true);
        history.create_version(&content(&["Kate"]), None, false);
        let stats = history.stats();
        assert_eq!(stats.total_versions, 2);
        assert_eq!(stats.manual_saves, 1);
        assert_eq!(stats.auto_saves, 1);
        assert!(stats.oldest.unwrap() <= stats.newest.unwrap());
    }
}
