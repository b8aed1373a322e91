//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Receipt collection for city groups
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Collects receipt photos, reads their amounts and keeps per-city totals", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides TALLY_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the webhook server and background workers
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable API key authentication on /api/submissions (local testing only)
        #[arg(long)]
        no_auth: bool,
    },

    /// Show configuration and data directory status
    Status,

    /// Manage registered participants
    Users {
        #[command(subcommand)]
        action: Option<UsersAction>,
    },

    /// Manage collection periods
    Collections {
        #[command(subcommand)]
        action: Option<CollectionsAction>,
    },

    /// Show a participant's figures for the active period of their city
    Info {
        /// Telegram chat id of the participant
        chat_id: i64,
    },

    /// Show the payout total of a city's active period
    Total {
        /// City name
        city: String,
    },

    /// Print the per-folder report of a period
    Report {
        /// City name
        city: String,

        /// Period name (defaults to the active period of the city)
        #[arg(short, long)]
        period: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Also write the rendered report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the amount parser on a piece of receipt text
    Parse {
        /// Receipt text, e.g. "Total cost: 2502"
        #[arg(required = true)]
        text: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// List all participants
    List,

    /// Register or update a participant
    Add {
        /// Telegram chat id
        chat_id: i64,

        /// City
        city: String,

        /// Last name
        last_name: String,

        /// First name
        first_name: String,

        /// Telegram username
        #[arg(short, long)]
        username: Option<String>,

        /// Grant administrator rights
        #[arg(long)]
        admin: bool,
    },

    /// Remove a participant (their ledger files are kept)
    Remove {
        /// Telegram chat id
        chat_id: i64,
    },

    /// Grant or revoke administrator rights
    Admin {
        /// Telegram chat id
        chat_id: i64,

        /// Revoke instead of grant
        #[arg(long)]
        revoke: bool,
    },
}

#[derive(Subcommand)]
pub enum CollectionsAction {
    /// List active collections
    List,

    /// Start collecting receipts for a city and period
    Open {
        /// City
        city: String,

        /// Period name, e.g. "march"
        period: String,
    },

    /// Stop collecting for a city (files stay on disk)
    Close {
        /// City
        city: String,
    },
}
