//! Collection period commands

use anyhow::{bail, Result};
use tally_core::models::is_safe_name;
use tally_core::{CollectionKey, Stores};

pub fn cmd_collections_list(stores: &Stores) -> Result<()> {
    let active = stores.registry.list();

    if active.is_empty() {
        println!("No active collections.");
        return Ok(());
    }

    println!();
    println!("{:<16} {}", "CITY", "PERIOD");
    println!("{}", "-".repeat(32));
    for key in &active {
        println!("{:<16} {}", key.city, key.period);
    }
    Ok(())
}

pub fn cmd_collections_open(stores: &Stores, city: &str, period: &str) -> Result<()> {
    if !is_safe_name(city) || !is_safe_name(period) {
        bail!("City and period must be single words without path characters");
    }

    let key = CollectionKey::new(city, period);
    stores.registry.open(&key)?;
    println!("✅ Collecting receipts for {} ({})", city, period);
    println!("   Users are not notified from the CLI; use /collect in the bot to announce it");
    Ok(())
}

pub fn cmd_collections_close(stores: &Stores, city: &str) -> Result<()> {
    let key = stores.registry.require_active(city)?;
    stores.registry.close(&key)?;
    println!("🛑 Closed {} ({})", key.city, key.period);
    println!("   Files stay under {}", stores.ledger.period_dir(&key).display());
    Ok(())
}
