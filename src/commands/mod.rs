mod config_cmd;
mod docs;
mod pending;
mod status;

use clap::ValueEnum;

pub use config_cmd::ConfigCommand;
pub use docs::{DeleteCommand, ListCommand, PutCommand, ShowCommand};
pub use pending::PendingCommand;
pub use status::StatusCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
