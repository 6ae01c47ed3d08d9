//! Share-code protocol for ad-hoc session snapshots.
//!
//! Mints a short human-speakable code, persists the session under it in
//! the ownerless `shared_sessions` table, and resolves a code back to a
//! session until expiry. Codes avoid confusable characters (0/O, 1/I,
//! 5/S, 8/B) so they survive being read aloud.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::Value;
use thiserror::Error;

use crate::cloud::{RemoteBackend, RemoteError, ShareRecord};
use crate::models::{Session, Step};

/// Characters a share code may contain.
pub const CODE_ALPHABET: &[u8] = b"ACDEFGHJKLMNPQRTUVWXYZ234679";
/// Share-code length.
pub const CODE_LENGTH: usize = 6;
/// Collision retries before the save is abandoned.
pub const MAX_CODE_ATTEMPTS: usize = 3;
/// How long a shared session stays resolvable.
pub const SHARE_TTL_DAYS: i64 = 30;

/// Errors from the share protocol.
#[derive(Error, Debug)]
pub enum ShareError {
    #[error("Could not generate a unique share code. Please try again.")]
    CodeExhausted,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// A successfully published share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedShare {
    pub share_code: String,
    pub share_url: String,
}

/// Generate one candidate share code.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Publish a session snapshot under a fresh share code.
///
/// The recipient always starts on the map step, so the stored snapshot
/// carries that step regardless of where the sender was. Each collision
/// retry uses a code distinct from every code already attempted in this
/// call; any non-collision failure aborts immediately, and after
/// [`MAX_CODE_ATTEMPTS`] collisions the save is abandoned.
pub async fn save_session(
    backend: &Arc<dyn RemoteBackend>,
    session: &Session,
    base_url: &str,
) -> Result<SavedShare, ShareError> {
    let mut payload = session.clone();
    payload.set_step(Step::Map);
    let session_value =
        serde_json::to_value(&payload).map_err(|e| RemoteError::Decode(e.to_string()))?;

    let mut attempted: Vec<String> = Vec::with_capacity(MAX_CODE_ATTEMPTS);
    for _ in 0..MAX_CODE_ATTEMPTS {
        let mut share_code = generate_code();
        while attempted.contains(&share_code) {
            share_code = generate_code();
        }
        attempted.push(share_code.clone());

        let record = ShareRecord {
            share_code: share_code.clone(),
            session: session_value.clone(),
            expires_at: Utc::now() + Duration::days(SHARE_TTL_DAYS),
        };
        match backend.insert_share(&record).await {
            Ok(()) => {
                tracing::info!("Session shared under code {}", share_code);
                return Ok(SavedShare {
                    share_url: build_share_url(base_url, &share_code),
                    share_code,
                });
            }
            Err(RemoteError::UniqueViolation) => {
                tracing::debug!("Share code {} collided, retrying", share_code);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ShareError::CodeExhausted)
}

/// Resolve a share code back to a session.
///
/// Input is trimmed and uppercased before lookup. Missing codes, expired
/// records, and snapshots that fail the shape check all resolve to
/// `None`; only transport failures surface as errors. A resolved session
/// starts on the map step.
pub async fn load_session(
    backend: &Arc<dyn RemoteBackend>,
    share_code: &str,
) -> Result<Option<Session>, ShareError> {
    let code = share_code.trim().to_uppercase();
    let Some(record) = backend.share_by_code(&code).await? else {
        return Ok(None);
    };
    if record.expires_at <= Utc::now() {
        tracing::debug!("Share code {} expired", code);
        return Ok(None);
    }
    Ok(accept_snapshot(&record.session))
}

// Shape check before accepting a stored snapshot: an object with a
// string subject name and a relationships array, nothing looser.
fn accept_snapshot(value: &Value) -> Option<Session> {
    let object = value.as_object()?;
    if !object.get("subject_name").is_some_and(Value::is_string) {
        return None;
    }
    if !object.get("relationships").is_some_and(Value::is_array) {
        return None;
    }

    let mut session: Session = serde_json::from_value(value.clone()).ok()?;
    session.set_step(Step::Map);
    session.sync_id_counter();
    Some(session)
}

/// Shareable URL for a code: the base location with any existing query
/// or fragment stripped, plus a `share` parameter.
pub fn build_share_url(base_url: &str, share_code: &str) -> String {
    let base = base_url
        .split(['?', '#'])
        .next()
        .unwrap_or(base_url);
    format!("{}?share={}", base, share_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::testing::InMemoryBackend;

    fn backend() -> Arc<dyn RemoteBackend> {
        Arc::new(InMemoryBackend::new())
    }

    fn session() -> Session {
        let mut session = Session::new();
        session.set_subject_name("Jordan");
        session.add_relationship("Kate").unwrap();
        session.add_relationship("Sam").unwrap();
        session.set_step(Step::Complete);
        session
    }

    #[test]
    fn test_generated_codes_use_safe_alphabet() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let backend = backend();
        let saved = save_session(&backend, &session(), "https://example.com/app")
            .await
            .unwrap();
        assert_eq!(saved.share_code.len(), CODE_LENGTH);
        assert_eq!(
            saved.share_url,
            format!("https://example.com/app?share={}", saved.share_code)
        );

        let loaded = load_session(&backend, &saved.share_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.subject_name, "Jordan");
        assert_eq!(loaded.relationships.len(), 2);
        // The sender was on the completion step; the recipient starts on the map
        assert_eq!(loaded.current_step, Step::Map);
    }

    #[tokio::test]
    async fn test_load_trims_and_uppercases() {
        let backend = backend();
        let saved = save_session(&backend, &session(), "https://example.com")
            .await
            .unwrap();
        let sloppy = format!("  {}  ", saved.share_code.to_lowercase());
        assert!(load_session(&backend, &sloppy).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_code_resolves_to_none() {
        let backend = backend();
        assert!(load_session(&backend, "AAAAAA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_share_resolves_to_none() {
        let backend = backend();
        let record = ShareRecord {
            share_code: "CCCCCC".to_string(),
            session: serde_json::to_value(session()).unwrap(),
            expires_at: Utc::now() - Duration::days(1),
        };
        backend.insert_share(&record).await.unwrap();
        assert!(load_session(&backend, "CCCCCC").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_snapshot_resolves_to_none() {
        let backend = backend();
        let record = ShareRecord {
            share_code: "DDDDDD".to_string(),
            session: serde_json::json!({ "subject_name": "X", "relationships": "nope" }),
            expires_at: Utc::now() + Duration::days(1),
        };
        backend.insert_share(&record).await.unwrap();
        assert!(load_session(&backend, "DDDDDD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collisions_retry_then_succeed() {
        let in_memory = Arc::new(InMemoryBackend::new());
        in_memory.collide_next_shares(MAX_CODE_ATTEMPTS - 1);
        let backend = Arc::clone(&in_memory) as Arc<dyn RemoteBackend>;

        let saved = save_session(&backend, &session(), "https://example.com")
            .await
            .unwrap();
        assert_eq!(in_memory.share_codes(), vec![saved.share_code]);
    }

    #[tokio::test]
    async fn test_collision_retries_are_bounded() {
        let in_memory = Arc::new(InMemoryBackend::new());
        in_memory.collide_next_shares(MAX_CODE_ATTEMPTS);
        let backend = Arc::clone(&in_memory) as Arc<dyn RemoteBackend>;

        let result = save_session(&backend, &session(), "https://example.com").await;
        assert!(matches!(result, Err(ShareError::CodeExhausted)));
        assert!(in_memory.share_codes().is_empty());
    }

    #[tokio::test]
    async fn test_non_collision_failure_aborts() {
        let in_memory = Arc::new(InMemoryBackend::new());
        in_memory.fail_writes(true);
        let backend = Arc::clone(&in_memory) as Arc<dyn RemoteBackend>;

        let result = save_session(&backend, &session(), "https://example.com").await;
        assert!(matches!(result, Err(ShareError::Remote(_))));
        assert!(in_memory.share_codes().is_empty());
    }

    #[test]
    fn test_build_share_url_strips_query_and_fragment() {
        assert_eq!(
            build_share_url("https://example.com/app?foo=1#frag", "ABC234"),
            "https://example.com/app?share=ABC234"
        );
        assert_eq!(
            build_share_url("https://example.com/app", "ABC234"),
            "https://example.com/app?share=ABC234"
        );
    }
}
