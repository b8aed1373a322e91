//! Shared command utilities and the status command
//!
//! This module contains:
//! - `load_config` - Load configuration, honoring `--data-dir`
//! - `open_stores` - Open the user directory, registry and ledger
//! - `cmd_status` - Show configuration and data directory status

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{Config, Stores};

/// Load configuration from the environment and config file
///
/// `--data-dir` takes the place of `TALLY_DATA_DIR`, so it also decides
/// where the config file is looked up.
pub fn load_config(data_dir: Option<&Path>) -> Result<Config> {
    let config = match data_dir {
        Some(dir) => {
            let dir = dir.to_string_lossy().into_owned();
            Config::load_with(|name| {
                if name == "TALLY_DATA_DIR" {
                    Some(dir.clone())
                } else {
                    std::env::var(name).ok()
                }
            })
        }
        None => Config::load(),
    };
    config.context("Failed to load configuration")
}

/// Open all stores under the configured data directory
pub fn open_stores(config: &Config) -> Result<Stores> {
    Stores::open(config).with_context(|| {
        format!(
            "Failed to open data directory {}",
            config.data_dir().display()
        )
    })
}

pub fn cmd_status(config: &Config) -> Result<()> {
    println!();
    println!("📊 Tally Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Data directory: {}", config.data_dir().display());
    println!(
        "   Debounce: {}s idle, {}s tick",
        config.idle_threshold.as_secs(),
        config.tick_interval.as_secs()
    );
    println!("   Decimal separator: '{}'", config.decimal_separator);

    if config.cities.is_empty() {
        println!("   Cities: any");
    } else {
        println!("   Cities: {}", config.cities.join(", "));
    }

    if config.telegram.token.is_some() {
        println!("   🤖 Telegram: configured ({})", config.telegram.api_base);
    } else {
        println!("   ⚠️  Telegram: TELEGRAM_BOT_TOKEN not set (dry-run)");
    }
    match &config.extractor.ollama_host {
        Some(host) => println!(
            "   🔍 OCR: {} at {} ({})",
            config.extractor.backend, host, config.extractor.vision_model
        ),
        None => println!("   ⚠️  OCR: not configured (set OLLAMA_HOST)"),
    }
    if let Some(keepalive) = &config.keepalive {
        println!(
            "   💓 Keep-alive: {} every {} min",
            keepalive.url,
            keepalive.interval.as_secs() / 60
        );
    }

    if config.data_dir().is_dir() {
        let stores = open_stores(config)?;
        println!();
        println!("   Users: {}", stores.users.list()?.len());
        println!("   Active collections: {}", stores.registry.len());
    } else {
        println!();
        println!("   (data directory not created yet)");
    }

    Ok(())
}
