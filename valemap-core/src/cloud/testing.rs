//! In-memory doubles for the remote backend and identity provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::auth::{AuthError, DeviceIdentity, IdentityProvider};
use super::error::RemoteError;
use super::remote::{MapRecord, MapSummary, NewMapRecord, RemoteBackend, ShareRecord};
use crate::models::{RelationshipRecord, ScorePair};

#[derive(Default)]
struct BackendState {
    maps: Vec<MapRecord>,
    shares: Vec<ShareRecord>,
    next_id: u64,
}

/// Backend double backed by two in-memory tables. Server-assigned ids are
/// plain integers and server share codes carry a separator, matching the
/// shapes the load disambiguation relies on.
#[derive(Default)]
pub(crate) struct InMemoryBackend {
    state: Mutex<BackendState>,
    fail_writes: AtomicBool,
    share_collisions: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make map writes fail with a transport error until cleared.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` share inserts fail as unique violations.
    pub fn collide_next_shares(&self, n: usize) {
        self.share_collisions.store(n, Ordering::SeqCst);
    }

    pub fn share_codes(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.shares.iter().map(|s| s.share_code.clone()).collect()
    }

    fn check_writes(&self) -> Result<(), RemoteError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Http("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for InMemoryBackend {
    async fn insert_map(&self, new: NewMapRecord) -> Result<MapRecord, RemoteError> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let n = state.next_id;
        let now = Utc::now();
        let record = MapRecord {
            id: n.to_string(),
            device_id: new.device_id,
            map_name: new.map_name,
            relationships: new.relationships,
            trust_scores: new.trust_scores,
            share_code: Some(format!("MAP-{:06}", n)),
            created_at: now,
            updated_at: now,
            accessed_at: None,
        };
        state.maps.push(record.clone());
        Ok(record)
    }

    async fn map_by_id(
        &self,
        id: &str,
        device_id: &str,
    ) -> Result<Option<MapRecord>, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .maps
            .iter()
            .find(|m| m.id == id && m.device_id == device_id)
            .cloned())
    }

    async fn map_by_share_code(&self, code: &str) -> Result<Option<MapRecord>, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .maps
            .iter()
            .find(|m| m.share_code.as_deref() == Some(code))
            .cloned())
    }

    async fn update_map(
        &self,
        id: &str,
        device_id: &str,
        relationships: &[RelationshipRecord],
        trust_scores: &HashMap<String, ScorePair>,
    ) -> Result<u64, RemoteError> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        let Some(map) = state
            .maps
            .iter_mut()
            .find(|m| m.id == id && m.device_id == device_id)
        else {
            return Ok(0);
        };
        map.relationships = relationships.to_vec();
        map.trust_scores = trust_scores.clone();
        map.updated_at = Utc::now();
        Ok(1)
    }

    async fn delete_map(&self, id: &str, device_id: &str) -> Result<u64, RemoteError> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        let before = state.maps.len();
        state
            .maps
            .retain(|m| !(m.id == id && m.device_id == device_id));
        Ok((before - state.maps.len()) as u64)
    }

    async fn list_maps(&self, device_id: &str) -> Result<Vec<MapSummary>, RemoteError> {
        let state = self.state.lock().unwrap();
        let mut maps: Vec<MapSummary> = state
            .maps
            .iter()
            .filter(|m| m.device_id == device_id)
            .map(|m| MapSummary {
                id: m.id.clone(),
                map_name: m.map_name.clone(),
                share_code: m.share_code.clone(),
                created_at: m.created_at,
                updated_at: m.updated_at,
                is_local: false,
            })
            .collect();
        maps.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(maps)
    }

    async fn touch_accessed(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        if let Some(map) = state.maps.iter_mut().find(|m| m.id == id) {
            map.accessed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn insert_share(&self, record: &ShareRecord) -> Result<(), RemoteError> {
        self.check_writes()?;
        let remaining = self.share_collisions.load(Ordering::SeqCst);
        if remaining > 0 {
            self.share_collisions.store(remaining - 1, Ordering::SeqCst);
            return Err(RemoteError::UniqueViolation);
        }
        let mut state = self.state.lock().unwrap();
        if state.shares.iter().any(|s| s.share_code == record.share_code) {
            return Err(RemoteError::UniqueViolation);
        }
        state.shares.push(record.clone());
        Ok(())
    }

    async fn share_by_code(&self, code: &str) -> Result<Option<ShareRecord>, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok(state.shares.iter().find(|s| s.share_code == code).cloned())
    }
}

/// Identity provider that always resolves to a fixed id.
pub(crate) struct StaticAuth {
    user_id: String,
}

impl StaticAuth {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticAuth {
    async fn existing_session(&self) -> Result<Option<DeviceIdentity>, AuthError> {
        Ok(Some(DeviceIdentity {
            user_id: self.user_id.clone(),
            access_token: Some("test-token".to_string()),
        }))
    }

    async fn sign_in_anonymously(&self) -> Result<DeviceIdentity, AuthError> {
        Ok(DeviceIdentity {
            user_id: self.user_id.clone(),
            access_token: Some("test-token".to_string()),
        })
    }
}

/// Identity provider that never answers, for exercising the wait budget.
pub(crate) struct HangingAuth;

#[async_trait]
impl IdentityProvider for HangingAuth {
    async fn existing_session(&self) -> Result<Option<DeviceIdentity>, AuthError> {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        Ok(None)
    }

    async fn sign_in_anonymously(&self) -> Result<DeviceIdentity, AuthError> {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        Err(AuthError::Http("unreachable".to_string()))
    }
}
