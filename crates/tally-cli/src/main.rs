//! Tally CLI - receipt collection for city groups
//!
//! Usage:
//!   tally serve --port 3000                 Start the webhook server
//!   tally users add 42 Minsk Petrov Ivan    Register a participant
//!   tally collections open Minsk march      Start collecting for a period
//!   tally report Minsk                      Print the report of the active period

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(config, &host, port, no_auth).await,
        Commands::Status => commands::cmd_status(&config),
        Commands::Users { action } => {
            let stores = commands::open_stores(&config)?;
            match action {
                None | Some(UsersAction::List) => commands::cmd_users_list(&stores),
                Some(UsersAction::Add {
                    chat_id,
                    city,
                    last_name,
                    first_name,
                    username,
                    admin,
                }) => commands::cmd_users_add(
                    &stores,
                    chat_id,
                    &city,
                    &last_name,
                    &first_name,
                    username.as_deref(),
                    admin,
                ),
                Some(UsersAction::Remove { chat_id }) => commands::cmd_users_remove(&stores, chat_id),
                Some(UsersAction::Admin { chat_id, revoke }) => {
                    commands::cmd_users_admin(&stores, chat_id, !revoke)
                }
            }
        }
        Commands::Collections { action } => {
            let stores = commands::open_stores(&config)?;
            match action {
                None | Some(CollectionsAction::List) => commands::cmd_collections_list(&stores),
                Some(CollectionsAction::Open { city, period }) => {
                    commands::cmd_collections_open(&stores, &city, &period)
                }
                Some(CollectionsAction::Close { city }) => {
                    commands::cmd_collections_close(&stores, &city)
                }
            }
        }
        Commands::Info { chat_id } => {
            let stores = commands::open_stores(&config)?;
            commands::cmd_info(&stores, chat_id, config.decimal_separator)
        }
        Commands::Total { city } => {
            let stores = commands::open_stores(&config)?;
            commands::cmd_total(&stores, &city, config.decimal_separator)
        }
        Commands::Report {
            city,
            period,
            json,
            output,
        } => {
            let stores = commands::open_stores(&config)?;
            commands::cmd_report(
                &stores,
                &city,
                period.as_deref(),
                json,
                output.as_deref(),
                config.decimal_separator,
            )
        }
        Commands::Parse { text } => commands::cmd_parse(&text.join(" ")),
    }
}
