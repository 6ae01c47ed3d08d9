//! Remote sync: identity resolution, the hosted-store backend, and the
//! cloud client that degrades to local storage when any of it is missing.

pub mod auth;
pub mod client;
pub mod error;
pub mod remote;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AnonymousAuth, AuthError, AuthEvent, DeviceIdentity, IdentityProvider};
pub use client::{
    CloudClient, DeleteOutcome, LoadedMap, SaveOutcome, UpdateOutcome, IDENTITY_WAIT, UNTITLED_MAP,
};
pub use error::{CloudError, RemoteError};
pub use remote::{MapRecord, MapSummary, NewMapRecord, RemoteBackend, RestBackend, ShareRecord};
