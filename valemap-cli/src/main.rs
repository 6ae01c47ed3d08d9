use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod autosave;
mod commands;
mod config;

use autosave::try_autosave;
use commands::{
    ConfigCommand, HistoryCommand, MapCommand, MapSubcommand, SessionCommand, SessionSubcommand,
    ShareCommand, ShareSubcommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "valemap")]
#[command(version)]
#[command(about = "A relationship trust mapping tool", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Work on the current session
    Session(SessionCommand),

    /// Save and retrieve maps
    Map(MapCommand),

    /// Inspect and manage the version history
    History(HistoryCommand),

    /// Share the current session with a short code
    Share(ShareCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "valemap=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    // Execute the command
    let result = execute_command(&cli.command, &config);

    // Autosave AFTER session-mutating commands (only if command succeeded)
    if result.is_ok() && is_write_command(&cli.command) {
        try_autosave(&config);
    }

    result
}

fn execute_command(
    command: &Option<Commands>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Some(Commands::Session(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Map(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::History(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Share(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

/// Returns true if the command mutates the session and should be followed
/// by an autosave check.
fn is_write_command(cmd: &Option<Commands>) -> bool {
    matches!(
        cmd,
        Some(Commands::Session(s)) if matches!(s.command,
            SessionSubcommand::Name { .. }
            | SessionSubcommand::Add { .. }
            | SessionSubcommand::Remove { .. }
            | SessionSubcommand::Rename { .. }
            | SessionSubcommand::Score { .. }
            | SessionSubcommand::Note { .. }
            | SessionSubcommand::Demo)
    ) || matches!(
        cmd,
        Some(Commands::Map(m)) if matches!(m.command,
            MapSubcommand::Save { .. } | MapSubcommand::Load { .. })
    ) || matches!(
        cmd,
        Some(Commands::Share(s)) if matches!(s.command, ShareSubcommand::Open { .. })
    )
}
