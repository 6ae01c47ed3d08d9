//! Automatic history snapshots around CLI commands.
//!
//! After a command mutates the session, a snapshot is cut when the most
//! recent version is older than the autosave interval (or when there is
//! no history yet). Errors are silently ignored; a missed autosave never
//! fails the command that triggered it.

use valemap_core::history::AUTOSAVE_INTERVAL;
use valemap_core::{LocalStore, MapContent, SessionStore, VersionHistory};

use crate::config::Config;

/// Cut an automatic snapshot of the current session if one is due.
pub fn try_autosave(config: &Config) {
    let store = LocalStore::new(config.data_dir.value.clone());
    let sessions = SessionStore::new(store.clone());

    let Some(session) = sessions.load_candidate() else {
        return;
    };
    let content = MapContent::from_session(&session);
    if content.is_empty() {
        return;
    }

    let mut history = VersionHistory::load(store);
    let due = match history.latest() {
        None => true,
        Some(latest) => VersionHistory::should_autosave(latest.timestamp, AUTOSAVE_INTERVAL),
    };
    if !due {
        return;
    }

    let version = history.create_version(&content, None, false);
    tracing::debug!(
        "Autosaved version {}: {}",
        version.sequence,
        version.change_summary
    );
}
