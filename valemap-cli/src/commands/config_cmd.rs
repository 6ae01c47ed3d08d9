use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;

use crate::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!("Config file: {} (not found)", config.config_path.display());
                        }
                        println!();

                        println!("data_dir: {}", config.data_dir.value.display());
                        println!("  source: {}", config.data_dir.source);
                        println!();

                        match &config.sync.server_url {
                            Some(url) => println!("sync.server_url: {}", url),
                            None => println!("sync.server_url: (not set)"),
                        }
                        println!(
                            "sync.anon_key: {}",
                            if config.sync.anon_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                        println!("sync.share_base_url: {}", config.sync.share_base());
                        println!(
                            "sync.offline: {}",
                            if config.sync.offline { "true" } else { "false" }
                        );
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                // Honors a --config override; defaults to the platform path
                let config_path = &config.config_path;

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'valemap config show' to view current configuration.");
                    return Ok(());
                }

                // Create parent directory
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                // Write default config
                let default_config = r#"# valemap configuration

# Directory for local data (default: ~/.local/share/valemap)
# data_dir: ~/.local/share/valemap

# Hosted store connection (leave unset to work locally)
# sync:
#   server_url: https://your-project.supabase.co
#   anon_key: your-publishable-key
#   share_base_url: https://valemap.app
"#;

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
