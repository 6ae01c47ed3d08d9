//! Session commands: build and edit the current relationship map.

use clap::{Args, Subcommand};
use std::str::FromStr;

use valemap_core::models::MAX_RELATIONSHIPS;
use valemap_core::{
    validate, DemoItem, LocalStore, Session, SessionError, SessionStore, Step, TrustLevel,
};

use crate::config::Config;

/// Work on the current session
#[derive(Args)]
pub struct SessionCommand {
    #[command(subcommand)]
    pub command: SessionSubcommand,
}

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// Show the current session
    Show,
    /// Set the subject the map is about
    Name {
        /// Subject name
        subject: String,
    },
    /// Add a relationship
    Add {
        /// Person's name
        name: String,
    },
    /// Remove a relationship
    Remove {
        /// Person's name
        name: String,
    },
    /// Rename a relationship
    Rename {
        /// Current name
        old: String,
        /// New name
        new: String,
    },
    /// Set trust scores for a relationship
    Score {
        /// Person's name
        name: String,
        /// Trust you extend to them: high, medium, low, unscored
        #[arg(long)]
        outbound: Option<String>,
        /// Trust they extend to you: high, medium, low, unscored
        #[arg(long)]
        inbound: Option<String>,
    },
    /// Attach a note to a relationship
    Note {
        /// Person's name
        name: String,
        /// Note text (empty clears)
        text: String,
    },
    /// Load the demo map, replacing the current session
    Demo,
    /// Clear the session and its stored snapshot
    Reset,
    /// Resume the stored session snapshot
    Resume,
    /// Move to a different step: landing, map, complete
    Step {
        /// Target step
        stage: String,
    },
}

impl SessionCommand {
    pub fn run(&self, config: &Config) -> Result<(), SessionCmdError> {
        let store = LocalStore::new(config.data_dir.value.clone());
        let sessions = SessionStore::new(store);
        let mut session = sessions.load_candidate().unwrap_or_default();

        match &self.command {
            SessionSubcommand::Show => {
                print_session(&session);
                return Ok(());
            }
            SessionSubcommand::Name { subject } => {
                session.set_subject_name(subject);
                println!("Subject: {}", session.subject_name);
            }
            SessionSubcommand::Add { name } => {
                session.add_relationship(name)?;
                println!(
                    "Added '{}' ({}/{})",
                    session.relationships.last().map(|r| r.name.as_str()).unwrap_or(name),
                    session.relationships.len(),
                    MAX_RELATIONSHIPS
                );
            }
            SessionSubcommand::Remove { name } => {
                let id = resolve_id(&session, name)?;
                session.remove_relationship(&id)?;
                println!("Removed '{}'", name);
            }
            SessionSubcommand::Rename { old, new } => {
                let id = resolve_id(&session, old)?;
                session.rename_relationship(&id, new)?;
                println!("Renamed '{}' to '{}'", old, new);
            }
            SessionSubcommand::Score {
                name,
                outbound,
                inbound,
            } => {
                let id = resolve_id(&session, name)?;
                if outbound.is_none() && inbound.is_none() {
                    // Bare `score` cycles the outbound level, like tapping the map
                    let level = session.cycle_outbound(&id)?;
                    println!("{}: outbound -> {}", name, level);
                } else {
                    if let Some(raw) = outbound {
                        let level = parse_level(raw)?;
                        session.set_outbound(&id, level)?;
                        println!("{}: outbound -> {}", name, level);
                    }
                    if let Some(raw) = inbound {
                        let level = parse_level(raw)?;
                        session.set_inbound(&id, level)?;
                        println!("{}: inbound -> {}", name, level);
                    }
                }
            }
            SessionSubcommand::Note { name, text } => {
                let id = resolve_id(&session, name)?;
                session.set_note(&id, text)?;
                println!("Note saved for '{}'", name);
            }
            SessionSubcommand::Demo => {
                session.clear();
                session.load_demo(demo_items());
                session.set_step(Step::Map);
                println!(
                    "Loaded demo map with {} relationships",
                    session.relationships.len()
                );
            }
            SessionSubcommand::Reset => {
                sessions.clear();
                println!("Session cleared");
                return Ok(());
            }
            SessionSubcommand::Resume => {
                match sessions.resume() {
                    Some(resumed) => {
                        println!(
                            "Resumed session for '{}' ({} relationships, step: {})",
                            resumed.subject_name,
                            resumed.relationships.len(),
                            step_name(resumed.current_step)
                        );
                    }
                    None => println!("No stored session to resume"),
                }
                return Ok(());
            }
            SessionSubcommand::Step { stage } => {
                let step =
                    Step::from_str(stage).map_err(SessionCmdError::InvalidArgument)?;
                session.advance_to(step)?;
                println!("Step: {}", step_name(step));
            }
        }

        sessions.persist(&session);
        Ok(())
    }
}

fn resolve_id(session: &Session, name: &str) -> Result<String, SessionCmdError> {
    session
        .find_by_name(name)
        .map(|r| r.id.clone())
        .ok_or_else(|| SessionCmdError::UnknownName(name.to_string()))
}

fn parse_level(raw: &str) -> Result<TrustLevel, SessionCmdError> {
    TrustLevel::from_str(raw).map_err(SessionCmdError::InvalidArgument)
}

fn step_name(step: Step) -> &'static str {
    match step {
        Step::Landing => "landing",
        Step::Map => "map",
        Step::Complete => "complete",
    }
}

fn print_session(session: &Session) {
    if session.is_empty() {
        println!("No session in progress.");
        println!();
        println!("Start with 'valemap session name <subject>' or 'valemap session demo'.");
        return;
    }

    println!("Subject: {}", session.subject_name);
    println!("Step:    {}", step_name(session.current_step));
    println!();

    if session.relationships.is_empty() {
        println!("No relationships yet.");
        return;
    }

    println!(
        "{:<20} {:<10} {:<10} NOTE",
        "NAME", "OUTBOUND", "INBOUND"
    );
    for r in &session.relationships {
        println!(
            "{:<20} {:<10} {:<10} {}",
            r.name,
            r.outbound.to_string(),
            r.inbound.to_string(),
            display_note(r.note.as_deref())
        );
    }
}

// Notes are stored raw and sanitized on display
fn display_note(note: Option<&str>) -> String {
    note.map(|n| validate::sanitize_text(n, validate::MAX_TITLE_LENGTH))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "-".to_string())
}

fn demo_items() -> Vec<DemoItem> {
    [
        ("Alex", TrustLevel::High, TrustLevel::High, Some("Mentor")),
        ("Jordan", TrustLevel::High, TrustLevel::Medium, None),
        ("Sam", TrustLevel::Medium, TrustLevel::Medium, Some("Teammate")),
        ("Riley", TrustLevel::Medium, TrustLevel::Low, None),
        ("Casey", TrustLevel::Low, TrustLevel::High, None),
        ("Morgan", TrustLevel::Low, TrustLevel::Unscored, Some("New contact")),
    ]
    .into_iter()
    .map(|(name, outbound, inbound, note)| DemoItem {
        name: name.to_string(),
        outbound,
        inbound,
        note: note.map(str::to_string),
    })
    .collect()
}

/// Errors from session commands
#[derive(Debug)]
pub enum SessionCmdError {
    Session(SessionError),
    UnknownName(String),
    InvalidArgument(String),
}

impl std::fmt::Display for SessionCmdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCmdError::Session(e) => write!(f, "{}", e),
            SessionCmdError::UnknownName(name) => {
                write!(f, "No relationship named '{}'", name)
            }
            SessionCmdError::InvalidArgument(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionCmdError {}

impl From<SessionError> for SessionCmdError {
    fn from(e: SessionError) -> Self {
        SessionCmdError::Session(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_note_sanitizes() {
        assert_eq!(display_note(None), "-");
        assert_eq!(display_note(Some("line manager")), "line manager");
        assert_eq!(
            display_note(Some("<script>alert(1)</script> mentor")),
            "alert(1) mentor"
        );
        assert_eq!(display_note(Some("<><>")), "-");
    }
}
