//! Ledger read commands (info, total, report)

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::amount::format_amount;
use tally_core::report::render_user_info;
use tally_core::{CollectionKey, Report, Stores};

pub fn cmd_info(stores: &Stores, chat_id: i64, separator: char) -> Result<()> {
    let user = stores
        .users
        .find_by_chat(chat_id)?
        .with_context(|| format!("No user with chat id {}", chat_id))?;
    let key = stores.registry.require_active(&user.city)?;

    println!("{} - {}", user.display_name(), key);
    match stores.ledger.summary(&key, &user)? {
        Some(summary) => println!("{}", render_user_info(Some(&summary), separator)),
        None => println!("No folder yet for this period."),
    }
    Ok(())
}

pub fn cmd_total(stores: &Stores, city: &str, separator: char) -> Result<()> {
    let key = stores.registry.require_active(city)?;
    let users = stores.users.list()?;
    let total = Report::city_total(&stores.ledger, &key, &users)?;

    println!("💰 {}: {}", key, format_amount(total, separator));
    Ok(())
}

pub fn cmd_report(
    stores: &Stores,
    city: &str,
    period: Option<&str>,
    json: bool,
    output: Option<&Path>,
    separator: char,
) -> Result<()> {
    let key = match period {
        Some(period) => CollectionKey::new(city, period),
        None => stores.registry.require_active(city)?,
    };
    let report = Report::for_period(&stores.ledger, &key)?;
    let rendered = report.render(separator);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", rendered);
    }

    if let Some(path) = output {
        std::fs::write(path, &rendered)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("📄 Report written to {}", path.display());
    }
    Ok(())
}
