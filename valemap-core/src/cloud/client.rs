//! Cloud storage client with local fallback.
//!
//! Every mutation prefers the remote store and degrades to a local
//! `cloudMaps` row when identity, connectivity, or the server is not
//! cooperating; the caller always gets an outcome, never a hard failure.
//! Reads are the opposite: a specific remote record has no local
//! substitute, so load errors surface. Identity resolution is bounded by
//! a wait budget, after which the client runs on a locally generated
//! fallback id and stops attempting remote calls for the session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{AuthEvent, DeviceIdentity, IdentityProvider};
use super::error::CloudError;
use super::remote::{MapSummary, NewMapRecord, RemoteBackend};
use crate::models::MapContent;
use crate::store::{LocalStore, StorageKey};
use crate::validate;

/// How long to wait for identity resolution before falling back.
pub const IDENTITY_WAIT: Duration = Duration::from_secs(5);

/// Title used when a map is saved without a usable one.
pub const UNTITLED_MAP: &str = "Untitled Map";

/// Resolved-identity state, settled once per client lifetime.
#[derive(Debug, Clone)]
enum IdentityState {
    Uninitialized,
    /// Provider-issued identity; remote calls allowed.
    Resolved(DeviceIdentity),
    /// Locally generated id; remote calls disabled for the session.
    Fallback(String),
}

/// Result of a save: where the map landed and under what handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub id: String,
    pub share_code: Option<String>,
    pub is_local: bool,
}

/// A loaded map, already sanitized.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedMap {
    pub id: String,
    pub map_name: String,
    pub content: MapContent,
    pub share_code: Option<String>,
    pub is_local: bool,
}

/// Result of an update: applied remotely, blocked by the server's
/// ownership check, or diverted to local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    Blocked,
    SavedLocally,
}

/// Result of a delete. A zero-row remote delete means the server refused,
/// which is a normal outcome here, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Blocked,
}

/// A map row kept in local storage when the remote store was unreachable.
/// Field names follow the browser app's `cloudMaps` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalMapRecord {
    id: String,
    device_id: String,
    map_name: String,
    relationships: Vec<crate::models::RelationshipRecord>,
    trust_scores: HashMap<String, crate::models::ScorePair>,
    saved_at: DateTime<Utc>,
    is_local: bool,
}

/// Pointer to a remotely saved map, kept for quick local listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapReference {
    share_code: Option<String>,
    map_name: String,
    last_saved: DateTime<Utc>,
}

type LocalMaps = HashMap<String, LocalMapRecord>;
type MapReferences = HashMap<String, MapReference>;

/// The remote sync client.
pub struct CloudClient {
    store: LocalStore,
    backend: Option<Arc<dyn RemoteBackend>>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    identity_wait: Duration,
    identity: IdentityState,
    online: bool,
}

impl CloudClient {
    pub fn new(
        store: LocalStore,
        backend: Option<Arc<dyn RemoteBackend>>,
        identity_provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            store,
            backend,
            identity_provider,
            identity_wait: IDENTITY_WAIT,
            identity: IdentityState::Uninitialized,
            online: true,
        }
    }

    /// Override the identity wait budget.
    pub fn with_identity_wait(mut self, wait: Duration) -> Self {
        self.identity_wait = wait;
        self
    }

    /// Start the client offline; remote calls are skipped until
    /// [`CloudClient::set_online`] flips it back.
    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    /// The identity that scopes this device's remote rows. Resolves on
    /// first use and then stays settled for the client's lifetime.
    pub async fn device_id(&mut self) -> String {
        self.ensure_identity().await;
        match &self.identity {
            IdentityState::Resolved(identity) => identity.user_id.clone(),
            IdentityState::Fallback(id) => id.clone(),
            // ensure_identity always settles the state
            IdentityState::Uninitialized => self.fallback_device_id(),
        }
    }

    async fn ensure_identity(&mut self) {
        if !matches!(self.identity, IdentityState::Uninitialized) {
            return;
        }

        if let Some(provider) = &self.identity_provider {
            match tokio::time::timeout(self.identity_wait, provider.resolve()).await {
                Ok(Ok(identity)) => {
                    self.adopt_identity(identity);
                    return;
                }
                Ok(Err(e)) => {
                    tracing::warn!("Identity resolution failed: {}", e);
                }
                Err(_) => {
                    tracing::warn!(
                        "Identity resolution timed out after {:?}",
                        self.identity_wait
                    );
                }
            }
        }

        self.identity = IdentityState::Fallback(self.fallback_device_id());
    }

    fn adopt_identity(&mut self, identity: DeviceIdentity) {
        if let Some(backend) = &self.backend {
            backend.set_access_token(identity.access_token.clone());
        }
        // Debug copy, handy when inspecting the data directory
        if let Err(e) = self.store.write(StorageKey::AuthUid, &identity.user_id) {
            tracing::warn!("Failed to record auth uid: {}", e);
        }
        tracing::info!("Using authenticated device identity: {}", identity.user_id);
        self.identity = IdentityState::Resolved(identity);
    }

    /// Durable locally generated identity, minted once and reused.
    fn fallback_device_id(&self) -> String {
        if let Some(id) = self.store.read::<String>(StorageKey::FallbackDeviceId) {
            return id;
        }
        let id = Uuid::new_v4().to_string();
        if let Err(e) = self.store.write(StorageKey::FallbackDeviceId, &id) {
            tracing::warn!("Failed to persist fallback device id: {}", e);
        }
        tracing::info!("Using fallback device identity: {}", id);
        id
    }

    fn is_remote(&self) -> bool {
        matches!(self.identity, IdentityState::Resolved(_))
            && self.online
            && self.backend.is_some()
    }

    /// The backend, but only while authenticated and online.
    fn remote_backend(&self) -> Option<Arc<dyn RemoteBackend>> {
        if self.is_remote() {
            self.backend.clone()
        } else {
            None
        }
    }

    /// Flip connectivity. Coming back online pushes any maps that were
    /// saved locally while unreachable.
    pub async fn set_online(&mut self, online: bool) {
        let was_online = self.online;
        self.online = online;
        if online && !was_online {
            self.sync_pending_local().await;
        }
    }

    /// React to an identity-provider notification.
    pub fn handle_auth_event(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(identity) | AuthEvent::UserUpdated(identity) => {
                self.adopt_identity(identity);
            }
            AuthEvent::TokenRefreshed(token) => {
                if let Some(backend) = &self.backend {
                    backend.set_access_token(Some(token.clone()));
                }
                if let IdentityState::Resolved(identity) = &mut self.identity {
                    identity.access_token = Some(token);
                }
            }
            AuthEvent::SignedOut => {
                if let Some(backend) = &self.backend {
                    backend.set_access_token(None);
                }
                self.store.remove(StorageKey::AuthUid);
                self.identity = IdentityState::Uninitialized;
            }
        }
    }

    /// Save a new map. Remote when possible; otherwise (or on any remote
    /// failure) the map lands in local storage under a generated id.
    pub async fn save(&mut self, title: &str, content: &MapContent) -> SaveOutcome {
        let device_id = self.device_id().await;
        let map_name = clean_title(title);
        let content = validate::sanitize_map_content(content);

        if let Some(backend) = self.remote_backend() {
            let new = NewMapRecord {
                device_id: device_id.clone(),
                map_name: map_name.clone(),
                relationships: content.relationships.clone(),
                trust_scores: content.trust_scores.clone(),
            };
            match backend.insert_map(new).await {
                Ok(record) => {
                    self.save_map_reference(
                        &record.id,
                        record.share_code.clone(),
                        &record.map_name,
                    );
                    tracing::info!("Map saved remotely: {}", record.id);
                    return SaveOutcome {
                        id: record.id,
                        share_code: record.share_code,
                        is_local: false,
                    };
                }
                Err(e) => {
                    tracing::warn!("Remote save failed, saving locally: {}", e);
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        self.save_local(&id, &device_id, &map_name, content)
    }

    fn save_local(
        &self,
        id: &str,
        device_id: &str,
        map_name: &str,
        content: MapContent,
    ) -> SaveOutcome {
        let mut maps: LocalMaps = self.store.read(StorageKey::LocalMaps).unwrap_or_default();
        let id = id.to_string();
        maps.insert(
            id.clone(),
            LocalMapRecord {
                id: id.clone(),
                device_id: device_id.to_string(),
                map_name: map_name.to_string(),
                relationships: content.relationships,
                trust_scores: content.trust_scores,
                saved_at: Utc::now(),
                is_local: true,
            },
        );
        if let Err(e) = self.store.write(StorageKey::LocalMaps, &maps) {
            tracing::warn!("Failed to write local maps: {}", e);
        }
        tracing::info!("Map saved locally: {}", id);
        SaveOutcome {
            id,
            share_code: None,
            is_local: true,
        }
    }

    /// Load a map by id or share code.
    ///
    /// Locally saved maps match by exact id first. Remote lookups
    /// disambiguate by shape: server share codes contain a separator,
    /// server ids do not. Share-code reads are unscoped; id reads are
    /// scoped to this device's identity. A successful remote load fires a
    /// non-blocking "mark accessed" touch whose failure is ignored.
    pub async fn load(&mut self, id_or_code: &str) -> Result<LoadedMap, CloudError> {
        let maps: LocalMaps = self.store.read(StorageKey::LocalMaps).unwrap_or_default();
        if let Some(record) = maps.get(id_or_code) {
            return Ok(loaded_from_local(record));
        }

        let device_id = self.device_id().await;
        if matches!(self.identity, IdentityState::Fallback(_)) {
            return Err(CloudError::NotAuthenticated);
        }
        let Some(backend) = self.remote_backend() else {
            return Err(CloudError::Offline);
        };
        let record = if id_or_code.contains('-') {
            backend.map_by_share_code(id_or_code).await?
        } else {
            backend.map_by_id(id_or_code, &device_id).await?
        };
        let record = record.ok_or_else(|| CloudError::NotFound(id_or_code.to_string()))?;

        let touch_backend = Arc::clone(&backend);
        let touch_id = record.id.clone();
        tokio::spawn(async move {
            if let Err(e) = touch_backend.touch_accessed(&touch_id).await {
                tracing::debug!("Failed to mark map accessed: {}", e);
            }
        });

        let content = validate::sanitize_map_content(&MapContent {
            relationships: record.relationships,
            trust_scores: record.trust_scores,
        });
        Ok(LoadedMap {
            id: record.id,
            map_name: clean_title(&record.map_name),
            content,
            share_code: record.share_code,
            is_local: false,
        })
    }

    /// Update an existing map's content. The write is scoped to this
    /// device's identity as well as the id; a zero-row result is the
    /// server blocking the write. Remote failures divert to local storage.
    pub async fn update(&mut self, id: &str, content: &MapContent) -> UpdateOutcome {
        let device_id = self.device_id().await;
        let content = validate::sanitize_map_content(content);

        let mut maps: LocalMaps = self.store.read(StorageKey::LocalMaps).unwrap_or_default();
        if let Some(record) = maps.get_mut(id) {
            record.relationships = content.relationships;
            record.trust_scores = content.trust_scores;
            record.saved_at = Utc::now();
            if let Err(e) = self.store.write(StorageKey::LocalMaps, &maps) {
                tracing::warn!("Failed to write local maps: {}", e);
            }
            return UpdateOutcome::SavedLocally;
        }

        if let Some(backend) = self.remote_backend() {
            match backend
                .update_map(id, &device_id, &content.relationships, &content.trust_scores)
                .await
            {
                Ok(0) => {
                    tracing::warn!("Remote update of {} affected no rows", id);
                    return UpdateOutcome::Blocked;
                }
                Ok(_) => return UpdateOutcome::Applied,
                Err(e) => {
                    tracing::warn!("Remote update failed, saving locally: {}", e);
                }
            }
        }

        let map_name = self
            .map_references()
            .get(id)
            .map(|r| r.map_name.clone())
            .unwrap_or_else(|| UNTITLED_MAP.to_string());
        // The fallback row keeps the requested id so a later load(id) sees
        // the updated content and a reconnect sync targets the same map.
        self.save_local(id, &device_id, &map_name, content);
        UpdateOutcome::SavedLocally
    }

    /// Delete a map. Locally saved maps are removed outright; remote
    /// deletes are identity-scoped and report a zero-row result as
    /// blocked. There is no local fallback for a remote delete.
    pub async fn delete(&mut self, id: &str) -> Result<DeleteOutcome, CloudError> {
        let mut maps: LocalMaps = self.store.read(StorageKey::LocalMaps).unwrap_or_default();
        if maps.remove(id).is_some() {
            if let Err(e) = self.store.write(StorageKey::LocalMaps, &maps) {
                tracing::warn!("Failed to write local maps: {}", e);
            }
            return Ok(DeleteOutcome::Deleted);
        }

        let device_id = self.device_id().await;
        if matches!(self.identity, IdentityState::Fallback(_)) {
            return Err(CloudError::NotAuthenticated);
        }
        let Some(backend) = self.remote_backend() else {
            return Err(CloudError::Offline);
        };
        let rows = backend.delete_map(id, &device_id).await?;
        if rows == 0 {
            return Ok(DeleteOutcome::Blocked);
        }
        self.remove_map_reference(id);
        Ok(DeleteOutcome::Deleted)
    }

    /// This device's maps, most recently updated first. Falls back to the
    /// locally saved rows when the remote store is unreachable.
    pub async fn list(&mut self) -> Vec<MapSummary> {
        let device_id = self.device_id().await;

        if let Some(backend) = self.remote_backend() {
            match backend.list_maps(&device_id).await {
                Ok(maps) => return maps,
                Err(e) => {
                    tracing::warn!("Remote list failed, listing local maps: {}", e);
                }
            }
        }

        self.local_summaries()
    }

    fn local_summaries(&self) -> Vec<MapSummary> {
        let maps: LocalMaps = self.store.read(StorageKey::LocalMaps).unwrap_or_default();
        let mut summaries: Vec<MapSummary> = maps
            .into_values()
            .map(|m| MapSummary {
                id: m.id,
                map_name: m.map_name,
                share_code: None,
                created_at: m.saved_at,
                updated_at: m.saved_at,
                is_local: true,
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// Push maps that were saved locally while the remote store was
    /// unreachable. Rows that sync are dropped from local storage; rows
    /// that fail stay for the next attempt.
    pub async fn sync_pending_local(&mut self) {
        self.ensure_identity().await;
        let Some(backend) = self.remote_backend() else {
            return;
        };

        let mut maps: LocalMaps = self.store.read(StorageKey::LocalMaps).unwrap_or_default();
        if maps.is_empty() {
            return;
        }

        let device_id = match &self.identity {
            IdentityState::Resolved(identity) => identity.user_id.clone(),
            _ => return,
        };

        let pending: Vec<String> = maps
            .iter()
            .filter(|(_, m)| m.is_local)
            .map(|(id, _)| id.clone())
            .collect();

        for local_id in pending {
            let Some(map) = maps.get(&local_id).cloned() else {
                continue;
            };
            let new = NewMapRecord {
                device_id: device_id.clone(),
                map_name: map.map_name.clone(),
                relationships: map.relationships,
                trust_scores: map.trust_scores,
            };
            match backend.insert_map(new).await {
                Ok(record) => {
                    self.save_map_reference(
                        &record.id,
                        record.share_code.clone(),
                        &record.map_name,
                    );
                    maps.remove(&local_id);
                    tracing::info!("Synced local map {} as {}", local_id, record.id);
                }
                Err(e) => {
                    tracing::warn!("Sync failed for local map {}: {}", local_id, e);
                }
            }
        }

        if let Err(e) = self.store.write(StorageKey::LocalMaps, &maps) {
            tracing::warn!("Failed to write local maps: {}", e);
        }
    }

    fn map_references(&self) -> MapReferences {
        self.store
            .read(StorageKey::MapReferences)
            .unwrap_or_default()
    }

    fn save_map_reference(&self, id: &str, share_code: Option<String>, map_name: &str) {
        let mut refs = self.map_references();
        refs.insert(
            id.to_string(),
            MapReference {
                share_code,
                map_name: map_name.to_string(),
                last_saved: Utc::now(),
            },
        );
        if let Err(e) = self.store.write(StorageKey::MapReferences, &refs) {
            tracing::warn!("Failed to write map references: {}", e);
        }
    }

    fn remove_map_reference(&self, id: &str) {
        let mut refs = self.map_references();
        if refs.remove(id).is_some() {
            if let Err(e) = self.store.write(StorageKey::MapReferences, &refs) {
                tracing::warn!("Failed to write map references: {}", e);
            }
        }
    }
}

fn clean_title(raw: &str) -> String {
    validate::validate_title(raw).unwrap_or_else(|_| UNTITLED_MAP.to_string())
}

fn loaded_from_local(record: &LocalMapRecord) -> LoadedMap {
    let content = validate::sanitize_map_content(&MapContent {
        relationships: record.relationships.clone(),
        trust_scores: record.trust_scores.clone(),
    });
    LoadedMap {
        id: record.id.clone(),
        map_name: clean_title(&record.map_name),
        content,
        share_code: None,
        is_local: true,
    }
}
