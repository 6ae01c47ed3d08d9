//! Map commands: save, load, list, and delete maps in the hosted store.

use clap::{Args, Subcommand};

use valemap_core::{
    CloudError, DeleteOutcome, LoadedMap, LocalStore, MapContent, SessionStore, Step,
    UpdateOutcome,
};

use crate::commands::cloud_client;
use crate::config::Config;

/// Save and retrieve maps
#[derive(Args)]
pub struct MapCommand {
    #[command(subcommand)]
    pub command: MapSubcommand,
}

#[derive(Subcommand)]
pub enum MapSubcommand {
    /// Save the current session as a map
    Save {
        /// Map title (defaults to the subject name)
        #[arg(long, short)]
        title: Option<String>,
    },
    /// Load a map into the current session by id or share code
    Load {
        /// Map id or share code
        id_or_code: String,
    },
    /// List this device's maps
    List,
    /// Update a saved map with the current session's content
    Update {
        /// Map id
        id: String,
    },
    /// Delete a map
    Delete {
        /// Map id
        id: String,
    },
    /// Push maps that were saved locally while unreachable
    Sync,
}

impl MapCommand {
    pub fn run(&self, config: &Config) -> Result<(), MapCmdError> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| MapCmdError::RuntimeError(e.to_string()))?;

        let mut client = cloud_client(config);
        let sessions = SessionStore::new(LocalStore::new(config.data_dir.value.clone()));

        match &self.command {
            MapSubcommand::Save { title } => rt.block_on(async {
                let session = sessions.load_candidate().ok_or(MapCmdError::NoSession)?;
                let content = MapContent::from_session(&session);
                let title = title.clone().unwrap_or_else(|| session.subject_name.clone());

                let outcome = client.save(&title, &content).await;
                if outcome.is_local {
                    println!("Saved locally (remote store unreachable)");
                    println!("  id: {}", outcome.id);
                } else {
                    println!("Map saved");
                    println!("  id: {}", outcome.id);
                    if let Some(code) = &outcome.share_code {
                        println!("  share code: {}", code);
                    }
                }
                Ok(())
            }),
            MapSubcommand::Load { id_or_code } => rt.block_on(async {
                let loaded = client.load(id_or_code).await?;
                apply_loaded(&sessions, &loaded);
                println!(
                    "Loaded '{}' ({} relationships){}",
                    loaded.map_name,
                    loaded.content.relationships.len(),
                    if loaded.is_local { " [local]" } else { "" }
                );
                Ok(())
            }),
            MapSubcommand::List => rt.block_on(async {
                let maps = client.list().await;
                if maps.is_empty() {
                    println!("No saved maps.");
                    return Ok(());
                }
                println!("{:<38} {:<24} {:<10} UPDATED", "ID", "NAME", "CODE");
                for map in maps {
                    println!(
                        "{:<38} {:<24} {:<10} {}{}",
                        map.id,
                        map.map_name,
                        map.share_code.as_deref().unwrap_or("-"),
                        map.updated_at.format("%Y-%m-%d %H:%M"),
                        if map.is_local { " [local]" } else { "" }
                    );
                }
                Ok(())
            }),
            MapSubcommand::Update { id } => rt.block_on(async {
                let session = sessions.load_candidate().ok_or(MapCmdError::NoSession)?;
                let content = MapContent::from_session(&session);
                match client.update(id, &content).await {
                    UpdateOutcome::Applied => println!("Map updated"),
                    UpdateOutcome::Blocked => {
                        println!("Update refused: not this device's map")
                    }
                    UpdateOutcome::SavedLocally => {
                        println!("Saved locally (remote store unreachable)")
                    }
                }
                Ok(())
            }),
            MapSubcommand::Delete { id } => rt.block_on(async {
                match client.delete(id).await? {
                    DeleteOutcome::Deleted => println!("Map deleted"),
                    DeleteOutcome::Blocked => {
                        println!("Delete refused: not this device's map")
                    }
                }
                Ok(())
            }),
            MapSubcommand::Sync => rt.block_on(async {
                client.set_online(true).await;
                client.sync_pending_local().await;
                println!("Sync complete.");
                Ok(())
            }),
        }
    }
}

// A loaded map replaces the session's relationships and drops the user on
// the map step; an in-flight subject name is kept.
fn apply_loaded(sessions: &SessionStore, loaded: &LoadedMap) {
    let mut session = sessions.load_candidate().unwrap_or_default();
    session.relationships = loaded.content.to_relationships();
    if session.subject_name.is_empty() {
        session.set_subject_name(&loaded.map_name);
    }
    session.set_step(Step::Map);
    session.sync_id_counter();
    sessions.persist(&session);
}

/// Errors from map commands
#[derive(Debug)]
pub enum MapCmdError {
    RuntimeError(String),
    Cloud(CloudError),
    NoSession,
}

impl std::fmt::Display for MapCmdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapCmdError::RuntimeError(e) => write!(f, "Failed to start runtime: {}", e),
            MapCmdError::Cloud(e) => write!(f, "{}", e),
            MapCmdError::NoSession => {
                write!(f, "No session in progress - nothing to save")
            }
        }
    }
}

impl std::error::Error for MapCmdError {}

impl From<CloudError> for MapCmdError {
    fn from(e: CloudError) -> Self {
        MapCmdError::Cloud(e)
    }
}
