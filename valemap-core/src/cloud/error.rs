//! Cloud storage error types.

use thiserror::Error;

/// Errors from the remote backend (transport and protocol).
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Server returned status {0}: {1}")]
    Status(u16, String),

    #[error("Unique constraint violation")]
    UniqueViolation,

    #[error("Failed to decode server response: {0}")]
    Decode(String),
}

/// Errors surfaced by the cloud storage client.
///
/// Mutation-type operations fall back to local storage instead of
/// returning most of these; read-type operations surface them because
/// there is no local substitute for a specific remote record.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Not authenticated - cannot load from the remote store")]
    NotAuthenticated,

    #[error("Offline - cannot load from the remote store")]
    Offline,

    #[error("Map not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}
