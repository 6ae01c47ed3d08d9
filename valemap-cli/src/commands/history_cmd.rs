//! Version history commands.

use clap::{Args, Subcommand};
use std::fs;
use std::path::PathBuf;

use valemap_core::{
    HistoryError, LocalStore, MapContent, SessionStore, Step, Version, VersionHistory,
};

use crate::config::Config;

/// Inspect and manage the version history
#[derive(Args)]
pub struct HistoryCommand {
    #[command(subcommand)]
    pub command: HistorySubcommand,
}

#[derive(Subcommand)]
pub enum HistorySubcommand {
    /// List saved versions
    List,
    /// Snapshot the current session as a manual version
    Save {
        /// Change summary (generated when omitted)
        #[arg(long, short)]
        summary: Option<String>,
    },
    /// Restore a version's content into the current session
    Restore {
        /// Version number
        sequence: u32,
    },
    /// Delete one version
    Delete {
        /// Version number
        sequence: u32,
    },
    /// Delete all versions
    Clear,
    /// Compare two versions
    Diff {
        /// Older version number
        a: u32,
        /// Newer version number
        b: u32,
    },
    /// Export the history as a JSON document
    Export {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Replace the history from an exported document
    Import {
        /// Exported JSON file
        file: PathBuf,
    },
    /// Show history statistics
    Stats,
}

impl HistoryCommand {
    pub fn run(&self, config: &Config) -> Result<(), HistoryCmdError> {
        let store = LocalStore::new(config.data_dir.value.clone());
        let sessions = SessionStore::new(store.clone());
        let mut history = VersionHistory::load(store);

        match &self.command {
            HistorySubcommand::List => {
                if history.versions().is_empty() {
                    println!("No versions saved.");
                    return Ok(());
                }
                println!("{:<4} {:<18} {:<6} {:<6} SUMMARY", "VER", "SAVED", "KIND", "RELS");
                for version in history.versions() {
                    print_version_row(version);
                }
            }
            HistorySubcommand::Save { summary } => {
                let session = sessions
                    .load_candidate()
                    .ok_or(HistoryCmdError::NoSession)?;
                let content = MapContent::from_session(&session);
                let version = history.create_version(&content, summary.clone(), true);
                println!(
                    "Saved version {}: {}",
                    version.sequence, version.change_summary
                );
            }
            HistorySubcommand::Restore { sequence } => {
                let content = history.restore_version(*sequence)?;
                let mut session = sessions.load_candidate().unwrap_or_default();
                session.relationships = content.to_relationships();
                session.set_step(Step::Map);
                session.sync_id_counter();
                sessions.persist(&session);
                println!(
                    "Restored version {} ({} relationships)",
                    sequence,
                    content.relationships.len()
                );
            }
            HistorySubcommand::Delete { sequence } => {
                history.delete_version(*sequence)?;
                println!("Deleted version {}", sequence);
            }
            HistorySubcommand::Clear => {
                history.clear_all();
                println!("Version history cleared");
            }
            HistorySubcommand::Diff { a, b } => {
                let diff = history.compare_versions(*a, *b)?;
                if diff.added.is_empty() && diff.removed.is_empty() && diff.modified.is_empty() {
                    println!("No differences.");
                    return Ok(());
                }
                for name in &diff.added {
                    println!("+ {}", name);
                }
                for name in &diff.removed {
                    println!("- {}", name);
                }
                for change in &diff.modified {
                    println!(
                        "~ {}: {}/{} -> {}/{}",
                        change.name,
                        change.before.outward,
                        change.before.inward,
                        change.after.outward,
                        change.after.inward
                    );
                }
            }
            HistorySubcommand::Export { out } => {
                let doc = serde_json::to_string_pretty(&history.export_all())
                    .map_err(HistoryCmdError::Serialize)?;
                match out {
                    Some(path) => {
                        fs::write(path, doc)
                            .map_err(|e| HistoryCmdError::Io(path.clone(), e))?;
                        println!("Exported {} version(s) to {}",
                            history.versions().len(), path.display());
                    }
                    None => println!("{}", doc),
                }
            }
            HistorySubcommand::Import { file } => {
                let contents =
                    fs::read_to_string(file).map_err(|e| HistoryCmdError::Io(file.clone(), e))?;
                let doc = serde_json::from_str(&contents).map_err(HistoryCmdError::Serialize)?;
                let count = history.import_all(&doc)?;
                println!("Imported {} version(s)", count);
            }
            HistorySubcommand::Stats => {
                let stats = history.stats();
                println!("Versions: {}", stats.total_versions);
                println!("  manual: {}", stats.manual_saves);
                println!("  auto:   {}", stats.auto_saves);
                if let Some(oldest) = stats.oldest {
                    println!("Oldest:   {}", oldest.format("%Y-%m-%d %H:%M"));
                }
                if let Some(newest) = stats.newest {
                    println!("Newest:   {}", newest.format("%Y-%m-%d %H:%M"));
                }
            }
        }

        Ok(())
    }
}

fn print_version_row(version: &Version) {
    println!(
        "{:<4} {:<18} {:<6} {:<6} {}",
        version.sequence,
        version.timestamp.format("%Y-%m-%d %H:%M"),
        if version.is_manual { "manual" } else { "auto" },
        version.relationship_count,
        version.change_summary
    );
}

/// Errors from history commands
#[derive(Debug)]
pub enum HistoryCmdError {
    History(HistoryError),
    NoSession,
    Io(PathBuf, std::io::Error),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for HistoryCmdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryCmdError::History(e) => write!(f, "{}", e),
            HistoryCmdError::NoSession => {
                write!(f, "No session in progress - nothing to snapshot")
            }
            HistoryCmdError::Io(path, e) => {
                write!(f, "I/O error for '{}': {}", path.display(), e)
            }
            HistoryCmdError::Serialize(e) => write!(f, "Invalid JSON: {}", e),
        }
    }
}

impl std::error::Error for HistoryCmdError {}

impl From<HistoryError> for HistoryCmdError {
    fn from(e: HistoryError) -> Self {
        HistoryCmdError::History(e)
    }
}
