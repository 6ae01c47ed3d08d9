//! Remote backend for the hosted map store.
//!
//! The hosted store exposes two tables over a PostgREST-style interface:
//! `trust_maps` (owner-scoped rows with a server-assigned share code) and
//! `shared_sessions` (ownerless snapshots keyed by a client-generated
//! code). Row-level authorization lives entirely on the server; this
//! client attaches the owner filter and treats a zero-row response as the
//! rejection signal.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::RemoteError;
use crate::models::{RelationshipRecord, ScorePair};

/// A row of the consumed `trust_maps` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapRecord {
    pub id: String,
    pub device_id: String,
    pub map_name: String,
    #[serde(default)]
    pub relationships: Vec<RelationshipRecord>,
    #[serde(default)]
    pub trust_scores: HashMap<String, ScorePair>,
    pub share_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accessed_at: Option<DateTime<Utc>>,
}

/// Insert payload for `trust_maps`; the server assigns id, share code,
/// and timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct NewMapRecord {
    pub device_id: String,
    pub map_name: String,
    pub relationships: Vec<RelationshipRecord>,
    pub trust_scores: HashMap<String, ScorePair>,
}

/// Listing row: enough for a picker, none of the content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSummary {
    pub id: String,
    pub map_name: String,
    #[serde(default)]
    pub share_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_local: bool,
}

/// A row of the consumed `shared_sessions` table: an opaque serialized
/// session under a client-generated code, readable by any code holder
/// until expiry, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareRecord {
    pub share_code: String,
    pub session: Value,
    pub expires_at: DateTime<Utc>,
}

/// Operations this core consumes from the hosted store.
///
/// Injected explicitly so the cloud client and share protocol can run
/// against an in-memory double in tests.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn insert_map(&self, new: NewMapRecord) -> Result<MapRecord, RemoteError>;

    /// Id lookups are scoped to the caller's own identity.
    async fn map_by_id(&self, id: &str, device_id: &str)
        -> Result<Option<MapRecord>, RemoteError>;

    /// Share-code lookups are unscoped: anyone with the code may read.
    async fn map_by_share_code(&self, code: &str) -> Result<Option<MapRecord>, RemoteError>;

    /// Returns rows affected; zero means the server blocked the write.
    async fn update_map(
        &self,
        id: &str,
        device_id: &str,
        relationships: &[RelationshipRecord],
        trust_scores: &HashMap<String, ScorePair>,
    ) -> Result<u64, RemoteError>;

    /// Returns rows affected; zero means the server blocked the delete.
    async fn delete_map(&self, id: &str, device_id: &str) -> Result<u64, RemoteError>;

    /// The caller's own rows, most recently updated first.
    async fn list_maps(&self, device_id: &str) -> Result<Vec<MapSummary>, RemoteError>;

    async fn touch_accessed(&self, id: &str) -> Result<(), RemoteError>;

    /// Fails with [`RemoteError::UniqueViolation`] on a share-code
    /// collision, which the share protocol retries.
    async fn insert_share(&self, record: &ShareRecord) -> Result<(), RemoteError>;

    async fn share_by_code(&self, code: &str) -> Result<Option<ShareRecord>, RemoteError>;

    /// Update the bearer token used for authenticated calls. No-op for
    /// backends that do not authenticate.
    fn set_access_token(&self, _token: Option<String>) {}
}

/// REST implementation against the hosted store.
#[derive(Debug)]
pub struct RestBackend {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
    access_token: RwLock<Option<String>>,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            client: reqwest::Client::new(),
            access_token: RwLock::new(None),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn bearer(&self) -> String {
        let token = self.access_token.read().ok().and_then(|t| t.clone());
        token.unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.bearer()))
    }

    async fn expect_rows<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Vec<T>, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 409 {
                return Err(RemoteError::UniqueViolation);
            }
            return Err(RemoteError::Status(status.as_u16(), body));
        }
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn insert_map(&self, new: NewMapRecord) -> Result<MapRecord, RemoteError> {
        let response = self
            .request(reqwest::Method::POST, self.table_url("trust_maps"))
            .header("Prefer", "return=representation")
            .json(&new)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        let rows: Vec<MapRecord> = Self::expect_rows(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode("insert returned no row".to_string()))
    }

    async fn map_by_id(
        &self,
        id: &str,
        device_id: &str,
    ) -> Result<Option<MapRecord>, RemoteError> {
        let url = format!(
            "{}?id=eq.{}&device_id=eq.{}&limit=1",
            self.table_url("trust_maps"),
            id,
            device_id
        );
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        let rows: Vec<MapRecord> = Self::expect_rows(response).await?;
        Ok(rows.into_iter().next())
    }

    async fn map_by_share_code(&self, code: &str) -> Result<Option<MapRecord>, RemoteError> {
        let url = format!(
            "{}?share_code=eq.{}&limit=1",
            self.table_url("trust_maps"),
            code
        );
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        let rows: Vec<MapRecord> = Self::expect_rows(response).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_map(
        &self,
        id: &str,
        device_id: &str,
        relationships: &[RelationshipRecord],
        trust_scores: &HashMap<String, ScorePair>,
    ) -> Result<u64, RemoteError> {
        let url = format!(
            "{}?id=eq.{}&device_id=eq.{}",
            self.table_url("trust_maps"),
            id,
            device_id
        );
        let body = serde_json::json!({
            "relationships": relationships,
            "trust_scores": trust_scores,
            "updated_at": Utc::now(),
        });
        let response = self
            .request(reqwest::Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        let rows: Vec<Value> = Self::expect_rows(response).await?;
        Ok(rows.len() as u64)
    }

    async fn delete_map(&self, id: &str, device_id: &str) -> Result<u64, RemoteError> {
        let url = format!(
            "{}?id=eq.{}&device_id=eq.{}",
            self.table_url("trust_maps"),
            id,
            device_id
        );
        let response = self
            .request(reqwest::Method::DELETE, url)
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        let rows: Vec<Value> = Self::expect_rows(response).await?;
        Ok(rows.len() as u64)
    }

    async fn list_maps(&self, device_id: &str) -> Result<Vec<MapSummary>, RemoteError> {
        let url = format!(
            "{}?device_id=eq.{}&select=id,map_name,share_code,created_at,updated_at&order=updated_at.desc",
            self.table_url("trust_maps"),
            device_id
        );
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        Self::expect_rows(response).await
    }

    async fn touch_accessed(&self, id: &str) -> Result<(), RemoteError> {
        let url = format!("{}?id=eq.{}", self.table_url("trust_maps"), id);
        let body = serde_json::json!({ "accessed_at": Utc::now() });
        self.request(reqwest::Method::PATCH, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        Ok(())
    }

    async fn insert_share(&self, record: &ShareRecord) -> Result<(), RemoteError> {
        let response = self
            .request(reqwest::Method::POST, self.table_url("shared_sessions"))
            .json(record)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        let status = response.status();
        if status.as_u16() == 409 {
            return Err(RemoteError::UniqueViolation);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status(status.as_u16(), body));
        }
        Ok(())
    }

    async fn share_by_code(&self, code: &str) -> Result<Option<ShareRecord>, RemoteError> {
        let url = format!(
            "{}?share_code=eq.{}&limit=1",
            self.table_url("shared_sessions"),
            code
        );
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        let rows: Vec<ShareRecord> = Self::expect_rows(response).await?;
        Ok(rows.into_iter().next())
    }

    fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.access_token.write() {
            *guard = token;
        }
    }
}
