use clap::{Args, Subcommand};
use repodoc_core::PendingDeletions;

use super::OutputFormat;
use repodoc::config::Config;

#[derive(Args)]
pub struct PendingCommand {
    #[command(subcommand)]
    pub command: PendingSubcommand,
}

#[derive(Subcommand)]
pub enum PendingSubcommand {
    /// List ids hidden locally because they were deleted
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Forget every pending deletion
    Clear,
}

impl PendingCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let mut pending = PendingDeletions::load(&config.state_path.value);

        match &self.command {
            PendingSubcommand::List { format } => {
                let ids: Vec<&str> = pending.ids().collect();
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&ids)?);
                    }
                    OutputFormat::Text => {
                        if ids.is_empty() {
                            println!("No pending deletions");
                            return Ok(());
                        }
                        for id in &ids {
                            println!("{}", id);
                        }
                        println!("\nTotal: {} id(s)", ids.len());
                    }
                }
                Ok(())
            }

            PendingSubcommand::Clear => {
                let count = pending.len();
                pending.clear()?;
                println!("Cleared {} pending deletion(s)", count);
                Ok(())
            }
        }
    }
}
