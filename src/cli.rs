//! Command-line interface definition for NebenChat
//!
//! This module defines the CLI structure using clap's derive API. The binary
//! is an operator tool over the history store: inspect, revert and clear a
//! user's sessions, and poke at the configured storage backend directly.

use clap::{Parser, Subcommand};

/// NebenChat - chat history store operator tool
#[derive(Parser, Debug, Clone)]
#[command(name = "nebenchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the storage backend (auto, local, api, git)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for NebenChat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Inspect and manage a user's chat sessions
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Operate on the storage backend directly
    Storage {
        /// Storage subcommand
        #[command(subcommand)]
        command: StorageCommand,
    },
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List a user's sessions, oldest first
    List {
        /// User id
        #[arg(short, long)]
        user: String,
    },

    /// Print the turns of a session (current session by default)
    Show {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Session id (or unique prefix)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Make an earlier session current again
    Revert {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Session id (or unique prefix)
        #[arg(short, long)]
        session: String,
    },

    /// Delete a user's whole history
    Clear {
        /// User id
        #[arg(short, long)]
        user: String,
    },
}

/// Storage backend subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum StorageCommand {
    /// List entries of a directory
    Ls {
        /// Directory path relative to the backend root
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file
    Cat {
        /// File path relative to the backend root
        path: String,
    },

    /// Remove a file
    Rm {
        /// File path relative to the backend root
        path: String,
    },

    /// Show which backend the configuration selects
    Check,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            backend: None,
            command: Commands::Storage {
                command: StorageCommand::Check,
            },
        }
    }
}
