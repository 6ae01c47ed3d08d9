//! Anonymous identity resolution.
//!
//! The hosted store scopes ownership by an opaque, provider-issued
//! identity. On startup the client adopts an existing auth session if one
//! is persisted, otherwise requests a fresh anonymous identity. Either
//! path is bounded by the caller's wait budget; past that the client runs
//! on a locally generated fallback identity and stops attempting remote
//! calls for the rest of the session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::LocalStore;

/// A resolved device identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Provider-issued user id; ownership scope for remote rows.
    pub user_id: String,
    /// Bearer token for authenticated remote calls.
    pub access_token: Option<String>,
}

/// State-change notifications emitted by the identity provider.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(DeviceIdentity),
    SignedOut,
    TokenRefreshed(String),
    UserUpdated(DeviceIdentity),
}

/// Errors from the identity provider.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Auth service returned status {0}: {1}")]
    Status(u16, String),

    #[error("Failed to decode auth response: {0}")]
    Decode(String),
}

/// The consumed identity provider: issues durable anonymous identities
/// and re-resolves persisted sessions on later visits.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Adopt an existing persisted session, if any is still valid.
    async fn existing_session(&self) -> Result<Option<DeviceIdentity>, AuthError>;

    /// Request a new anonymous identity.
    async fn sign_in_anonymously(&self) -> Result<DeviceIdentity, AuthError>;

    /// Existing session if present, else a fresh anonymous sign-in.
    async fn resolve(&self) -> Result<DeviceIdentity, AuthError> {
        if let Some(identity) = self.existing_session().await? {
            tracing::debug!("Existing auth session found: {}", identity.user_id);
            return Ok(identity);
        }
        let identity = self.sign_in_anonymously().await?;
        tracing::debug!("Anonymous authentication successful: {}", identity.user_id);
        Ok(identity)
    }
}

// Persisted auth session, stored next to the other local keys under the
// provider's classic key name.
#[derive(Debug, Serialize, Deserialize)]
struct StoredAuthSession {
    access_token: String,
    user_id: String,
}

const AUTH_SESSION_FILE: &str = "supabase.auth.token.json";

/// REST identity provider for the hosted auth service.
#[derive(Debug)]
pub struct AnonymousAuth {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
    store: LocalStore,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    access_token: String,
    user: SignInUser,
}

#[derive(Debug, Deserialize)]
struct SignInUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
}

impl AnonymousAuth {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>, store: LocalStore) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            client: reqwest::Client::new(),
            store,
        }
    }

    fn session_path(&self) -> std::path::PathBuf {
        self.store.data_dir().join(AUTH_SESSION_FILE)
    }

    fn read_stored_session(&self) -> Option<StoredAuthSession> {
        let contents = std::fs::read_to_string(self.session_path()).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn persist_session(&self, session: &StoredAuthSession) {
        if std::fs::create_dir_all(self.store.data_dir()).is_ok() {
            if let Ok(json) = serde_json::to_string(session) {
                if let Err(e) = std::fs::write(self.session_path(), json) {
                    tracing::warn!("Failed to persist auth session: {}", e);
                }
            }
        }
    }

    fn discard_session(&self) {
        let _ = std::fs::remove_file(self.session_path());
    }
}

#[async_trait]
impl IdentityProvider for AnonymousAuth {
    async fn existing_session(&self) -> Result<Option<DeviceIdentity>, AuthError> {
        let Some(stored) = self.read_stored_session() else {
            return Ok(None);
        };

        // Confirm the token is still good before adopting it
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", stored.access_token))
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        if !response.status().is_success() {
            tracing::debug!("Persisted auth session rejected, discarding");
            self.discard_session();
            return Ok(None);
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        Ok(Some(DeviceIdentity {
            user_id: user.id,
            access_token: Some(stored.access_token),
        }))
    }

    async fn sign_in_anonymously(&self) -> Result<DeviceIdentity, AuthError> {
        let url = format!("{}/auth/v1/signup", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status(status.as_u16(), body));
        }

        let session: SignInResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        self.persist_session(&StoredAuthSession {
            access_token: session.access_token.clone(),
            user_id: session.user.id.clone(),
        });

        Ok(DeviceIdentity {
            user_id: session.user.id,
            access_token: Some(session.access_token),
        })
    }
}
