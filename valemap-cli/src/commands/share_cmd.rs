//! Share commands: publish and open session snapshots by code.

use std::sync::Arc;

use clap::{Args, Subcommand};

use valemap_core::share;
use valemap_core::{LocalStore, RemoteBackend, RestBackend, SessionStore, ShareError};

use crate::config::Config;

/// Share the current session with a short code
#[derive(Args)]
pub struct ShareCommand {
    #[command(subcommand)]
    pub command: ShareSubcommand,
}

#[derive(Subcommand)]
pub enum ShareSubcommand {
    /// Publish the current session and print its share code
    Create,
    /// Load a shared session by code, replacing the current session
    Open {
        /// Share code
        code: String,
    },
    /// Print the shareable URL for a code
    Url {
        /// Share code
        code: String,
    },
}

impl ShareCommand {
    pub fn run(&self, config: &Config) -> Result<(), ShareCmdError> {
        if let ShareSubcommand::Url { code } = &self.command {
            println!("{}", share::build_share_url(config.sync.share_base(), code));
            return Ok(());
        }

        let backend = remote_backend(config)?;
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| ShareCmdError::RuntimeError(e.to_string()))?;
        let sessions = SessionStore::new(LocalStore::new(config.data_dir.value.clone()));

        match &self.command {
            ShareSubcommand::Create => rt.block_on(async {
                let session = sessions.load_candidate().ok_or(ShareCmdError::NoSession)?;
                let saved =
                    share::save_session(&backend, &session, config.sync.share_base()).await?;
                println!("Session shared");
                println!("  code: {}", saved.share_code);
                println!("  url:  {}", saved.share_url);
                Ok(())
            }),
            ShareSubcommand::Open { code } => rt.block_on(async {
                match share::load_session(&backend, code).await? {
                    Some(session) => {
                        println!(
                            "Opened shared session for '{}' ({} relationships)",
                            session.subject_name,
                            session.relationships.len()
                        );
                        sessions.persist(&session);
                        Ok(())
                    }
                    None => Err(ShareCmdError::NotFound(code.clone())),
                }
            }),
            ShareSubcommand::Url { .. } => Ok(()),
        }
    }
}

fn remote_backend(config: &Config) -> Result<Arc<dyn RemoteBackend>, ShareCmdError> {
    let (Some(url), Some(key)) = (&config.sync.server_url, &config.sync.anon_key) else {
        return Err(ShareCmdError::NotConfigured);
    };
    Ok(Arc::new(RestBackend::new(url.clone(), key.clone())))
}

/// Errors from share commands
#[derive(Debug)]
pub enum ShareCmdError {
    RuntimeError(String),
    Share(ShareError),
    NotConfigured,
    NotFound(String),
    NoSession,
}

impl std::fmt::Display for ShareCmdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareCmdError::RuntimeError(e) => write!(f, "Failed to start runtime: {}", e),
            ShareCmdError::Share(e) => write!(f, "{}", e),
            ShareCmdError::NotConfigured => {
                write!(
                    f,
                    "Sharing requires the remote store. Set sync.server_url and sync.anon_key \
                     in the config file, or VALEMAP_SYNC_URL and VALEMAP_ANON_KEY."
                )
            }
            ShareCmdError::NotFound(code) => {
                write!(f, "No shared session found for code '{}' (it may have expired)", code)
            }
            ShareCmdError::NoSession => {
                write!(f, "No session in progress - nothing to share")
            }
        }
    }
}

impl std::error::Error for ShareCmdError {}

impl From<ShareError> for ShareCmdError {
    fn from(e: ShareError) -> Self {
        ShareCmdError::Share(e)
    }
}
