//! On-device key-value storage.
//!
//! The browser app keeps everything under a handful of localStorage keys;
//! this store reproduces that contract exactly, one JSON document per key
//! in a data directory. Each subsystem owns a distinct key, so the single
//! writer never collides with itself.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// The owned storage-key contract. Key names must match the browser app's
/// localStorage names for interop with any existing stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Continuously mirrored session snapshot.
    Session,
    /// Bounded version-history log.
    VersionHistory,
    /// id -> share code + display name + last-saved time, for quick listing.
    MapReferences,
    /// Locally generated identity used when anonymous auth is unavailable.
    FallbackDeviceId,
    /// Fallback map rows written when the remote store is unreachable.
    LocalMaps,
    /// Debug copy of the resolved remote identity.
    AuthUid,
}

impl StorageKey {
    /// The localStorage key name this slot mirrors.
    pub fn name(&self) -> &'static str {
        match self {
            StorageKey::Session => "trustValenceSession",
            StorageKey::VersionHistory => "trustMapVersionHistory",
            StorageKey::MapReferences => "mapReferences",
            StorageKey::FallbackDeviceId => "fallbackDeviceId",
            StorageKey::LocalMaps => "cloudMaps",
            StorageKey::AuthUid => "current_auth_uid",
        }
    }

    fn filename(&self) -> String {
        format!("{}.json", self.name())
    }
}

/// File-per-key JSON store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    data_dir: PathBuf,
}

impl LocalStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn path(&self, key: StorageKey) -> PathBuf {
        self.data_dir.join(key.filename())
    }

    pub fn exists(&self, key: StorageKey) -> bool {
        self.path(key).exists()
    }

    /// Read and parse a stored value.
    ///
    /// Absence, unreadable files, and malformed JSON all resolve to `None`:
    /// corrupt persisted data is discarded, never partially accepted.
    pub fn read<T: DeserializeOwned>(&self, key: StorageKey) -> Option<T> {
        let path = self.path(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding corrupt data at {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Serialize and write a value, creating the data directory if needed.
    pub fn write<T: Serialize>(&self, key: StorageKey, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| StoreError::IoError(self.data_dir.clone(), e))?;
        let path = self.path(key);
        let json = serde_json::to_string(value).map_err(StoreError::SerializeError)?;
        fs::write(&path, json).map_err(|e| StoreError::IoError(path, e))
    }

    /// Remove a stored value. Removing an absent key is a no-op.
    pub fn remove(&self, key: StorageKey) {
        let path = self.path(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

/// Errors from local storage writes.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error writing a file (the quota-exceeded analogue).
    IoError(PathBuf, io::Error),
    /// Value could not be serialized.
    SerializeError(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            StoreError::SerializeError(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::IoError(_, e) => Some(e),
            StoreError::SerializeError(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (LocalStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_key_names_match_contract() {
        assert_eq!(StorageKey::Session.name(), "trustValenceSession");
        assert_eq!(StorageKey::VersionHistory.name(), "trustMapVersionHistory");
        assert_eq!(StorageKey::MapReferences.name(), "mapReferences");
        assert_eq!(StorageKey::FallbackDeviceId.name(), "fallbackDeviceId");
        assert_eq!(StorageKey::LocalMaps.name(), "cloudMaps");
        assert_eq!(StorageKey::AuthUid.name(), "current_auth_uid");
    }

    #[test]
    fn test_read_missing_returns_none() {
        let (store, _temp) = test_store();
        let value: Option<String> = store.read(StorageKey::Session);
        assert!(value.is_none());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (store, _temp) = test_store();
        store
            .write(StorageKey::FallbackDeviceId, &"device-123".to_string())
            .unwrap();
        let value: Option<String> = store.read(StorageKey::FallbackDeviceId);
        assert_eq!(value.as_deref(), Some("device-123"));
    }

    #[test]
    fn test_write_creates_nested_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("data");
        let store = LocalStore::new(nested.clone());
        store.write(StorageKey::AuthUid, &"uid").unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_corrupt_data_reads_as_none() {
        let (store, _temp) = test_store();
        std::fs::create_dir_all(store.data_dir()).unwrap();
        std::fs::write(store.path(StorageKey::Session), "{not json").unwrap();
        let value: Option<serde_json::Value> = store.read(StorageKey::Session);
        assert!(value.is_none());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let (store, _temp) = test_store();
        store.remove(StorageKey::Session);
        store.write(StorageKey::Session, &42u32).unwrap();
        store.remove(StorageKey::Session);
        assert!(!store.exists(StorageKey::Session));
    }
}
