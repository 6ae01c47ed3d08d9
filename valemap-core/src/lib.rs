//! Valemap Core Library
//!
//! Shared types and logic for the Valence Mapper applications: input
//! sanitization, local persistence, version history, remote sync, and
//! session sharing.

pub mod cloud;
pub mod history;
pub mod models;
pub mod session_store;
pub mod share;
pub mod store;
pub mod validate;

pub use cloud::{
    AnonymousAuth, AuthError, AuthEvent, CloudClient, CloudError, DeleteOutcome, DeviceIdentity,
    IdentityProvider, LoadedMap, MapRecord, MapSummary, RemoteBackend, RemoteError, RestBackend,
    SaveOutcome, ShareRecord, UpdateOutcome,
};
pub use history::{HistoryError, HistoryStats, ScoreChange, Version, VersionDiff, VersionHistory};
pub use models::{
    DemoItem, MapContent, Relationship, RelationshipRecord, ScorePair, Session, SessionError,
    Step, TrustLevel,
};
pub use session_store::SessionStore;
pub use share::{SavedShare, ShareError};
pub use store::{LocalStore, StorageKey, StoreError};
pub use validate::{MapCheck, ValidationError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
