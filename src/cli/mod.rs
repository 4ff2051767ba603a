pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::BackendKind;

#[derive(Parser)]
#[command(name = "keepsake")]
#[command(about = "Favorite listings, kept in sync across clients", long_about = None)]
pub struct Cli {
    /// Signed-in user id (overrides config and KEEPSAKE_USER)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Path to an alternate config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend to use instead of the configured one
    #[arg(short, long, value_enum, global = true)]
    pub backend: Option<BackendKind>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show whether a property is a favorite
    Status {
        /// Property id
        property: String,
    },
    /// Add or remove a property from favorites
    Toggle {
        /// Property id
        property: String,
    },
    /// List favorites, newest first
    List,
    /// Remove a favorite by its record id
    Remove {
        /// Favorite record id
        record_id: String,
    },
    /// Follow the favorites set live until interrupted
    Watch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["keepsake", "toggle", "villa-1", "--user", "alice", "-b", "rest"])
            .unwrap();

        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert_eq!(cli.backend, Some(BackendKind::Rest));
        assert!(matches!(cli.command, Commands::Toggle { property } if property == "villa-1"));
    }

    #[test]
    fn test_status_requires_property() {
        assert!(Cli::try_parse_from(["keepsake", "status"]).is_err());
    }
}
