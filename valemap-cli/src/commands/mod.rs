use std::sync::Arc;

use valemap_core::{AnonymousAuth, CloudClient, IdentityProvider, LocalStore, RemoteBackend, RestBackend};

use crate::config::Config;

mod config_cmd;
mod history_cmd;
mod map;
mod session;
mod share_cmd;

pub use config_cmd::ConfigCommand;
pub use history_cmd::HistoryCommand;
pub use map::{MapCommand, MapSubcommand};
pub use session::{SessionCommand, SessionSubcommand};
pub use share_cmd::{ShareCommand, ShareSubcommand};

/// Build the cloud client from configuration. Without a configured
/// remote, the client still works and keeps everything local.
pub(crate) fn cloud_client(config: &Config) -> CloudClient {
    let store = LocalStore::new(config.data_dir.value.clone());

    let (backend, auth): (
        Option<Arc<dyn RemoteBackend>>,
        Option<Arc<dyn IdentityProvider>>,
    ) = match (&config.sync.server_url, &config.sync.anon_key) {
        (Some(url), Some(key)) => (
            Some(Arc::new(RestBackend::new(url.clone(), key.clone()))),
            Some(Arc::new(AnonymousAuth::new(
                url.clone(),
                key.clone(),
                store.clone(),
            ))),
        ),
        _ => (None, None),
    };

    let mut client = CloudClient::new(store, backend, auth);
    if config.sync.offline {
        client = client.offline();
    }
    client
}
