use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;

use super::OutputFormat;
use repodoc::config::{mask_token, Config};

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
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("store_url: {}", config.store_url.value);
                        println!("  source: {}", config.store_url.source);
                        println!();

                        match &config.token.value {
                            Some(token) => println!("token: {}", mask_token(token)),
                            None => println!("token: (not set)"),
                        }
                        println!("  source: {}", config.token.source);
                        println!();

                        println!("state_path: {}", config.state_path.value.display());
                        println!("  source: {}", config.state_path.source);
                        println!();

                        println!("fetch_concurrency: {}", config.fetch_concurrency.value);
                        println!("  source: {}", config.fetch_concurrency.source);
                        println!();

                        println!("tombstone_namespace: {}", config.tombstone_namespace.value);
                        println!("  source: {}", config.tombstone_namespace.source);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'repodoc config show' to view current configuration.");
                    return Ok(());
                }

                // Create parent directory
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let default_config = r#"# repodoc configuration

# Base URL of the contents store
store_url: http://localhost:8080

# Bearer token for the store (or set REPODOC_TOKEN)
# token: your-secret-key-here

# Where locally deleted ids are remembered
# state_path: ~/.local/share/repodoc/pending_deletions.json

# Concurrent document fetches per listing
# fetch_concurrency: 8
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
