//! Session persistence adapter.
//!
//! Mirrors the in-memory [`Session`] to local storage after every mutation
//! and offers a one-shot restore path at startup. The lifecycle is
//! `Empty -> Active` on first mutation (or by hydration on resume),
//! `Active` loops on further mutation, and an explicit reset returns to
//! `Empty`.

use crate::models::{Session, Step};
use crate::store::{LocalStore, StorageKey};

/// Persistence adapter over the session storage key.
#[derive(Debug, Clone)]
pub struct SessionStore {
    store: LocalStore,
}

impl SessionStore {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Mirror the session to storage.
    ///
    /// A semantically empty session removes the stored snapshot instead of
    /// writing one, so a stale "empty" session never reaches the
    /// restore-prompt flow. Write failures are swallowed: the in-memory
    /// session stays authoritative for this run at the cost of durability.
    pub fn persist(&self, session: &Session) {
        if session.is_empty() {
            self.store.remove(StorageKey::Session);
            return;
        }
        if let Err(e) = self.store.write(StorageKey::Session, session) {
            tracing::warn!("Session snapshot not persisted: {}", e);
        }
    }

    /// Read the stored snapshot, if any survives the shape check.
    ///
    /// Malformed or empty snapshots resolve to `None`; there is no partial
    /// hydration.
    pub fn load_candidate(&self) -> Option<Session> {
        let mut session: Session = self.store.read(StorageKey::Session)?;
        if session.is_empty() {
            return None;
        }
        session.sync_id_counter();
        Some(session)
    }

    /// Hydrate a session from storage for resume.
    ///
    /// The terminal `Complete` stage maps back to `Map`: it is a dead-end
    /// that should not be re-entered on a later visit.
    pub fn resume(&self) -> Option<Session> {
        let mut session = self.load_candidate()?;
        if session.current_step == Step::Complete {
            session.current_step = Step::Map;
        }
        Some(session)
    }

    /// Discard the stored snapshot (the "start fresh" decision).
    pub fn clear(&self) {
        self.store.remove(StorageKey::Session);
    }

    /// Whether a snapshot exists on disk at all.
    pub fn has_snapshot(&self) -> bool {
        self.store.exists(StorageKey::Session)
    }
}
