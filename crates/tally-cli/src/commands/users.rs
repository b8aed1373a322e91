//! Participant management commands

use anyhow::{bail, Result};
use tally_core::models::is_safe_name;
use tally_core::{Stores, UserAccount};

pub fn cmd_users_list(stores: &Stores) -> Result<()> {
    let users = stores.users.list()?;

    if users.is_empty() {
        println!("No users registered.");
        return Ok(());
    }

    println!();
    println!(
        "{:>14}  {:<16} {:<24} {:<14} {}",
        "CHAT ID", "USERNAME", "NAME", "CITY", "ADMIN"
    );
    println!("{}", "-".repeat(78));
    for user in &users {
        println!(
            "{:>14}  {:<16} {:<24} {:<14} {}",
            user.chat_id,
            user.username.as_deref().unwrap_or("-"),
            user.display_name(),
            user.city,
            if user.is_admin { "yes" } else { "" }
        );
    }
    println!();
    println!("{} user(s)", users.len());

    Ok(())
}

pub fn cmd_users_add(
    stores: &Stores,
    chat_id: i64,
    city: &str,
    last_name: &str,
    first_name: &str,
    username: Option<&str>,
    admin: bool,
) -> Result<()> {
    for (field, value) in [
        ("city", city),
        ("last name", last_name),
        ("first name", first_name),
    ] {
        if !is_safe_name(value) {
            bail!("Invalid {}: '{}' (one word, no path characters)", field, value);
        }
    }
    if let Some(name) = username.filter(|u| !is_safe_name(u)) {
        bail!("Invalid username: '{}'", name);
    }

    let user = stores.users.upsert(UserAccount {
        username: username.map(String::from),
        chat_id,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        city: city.to_string(),
        is_admin: admin,
    })?;

    println!(
        "✅ Registered {} ({}) in {}{}",
        user.display_name(),
        user.chat_id,
        user.city,
        if user.is_admin { " as admin" } else { "" }
    );
    Ok(())
}

pub fn cmd_users_remove(stores: &Stores, chat_id: i64) -> Result<()> {
    let user = stores.users.remove(chat_id)?;
    println!("🗑️  Removed {} ({})", user.display_name(), user.chat_id);
    println!("   Ledger files under {} were kept", user.city);
    Ok(())
}

pub fn cmd_users_admin(stores: &Stores, chat_id: i64, is_admin: bool) -> Result<()> {
    let user = stores.users.set_admin(chat_id, is_admin)?;
    if user.is_admin {
        println!("👑 {} is now an administrator", user.display_name());
    } else {
        println!("{} is no longer an administrator", user.display_name());
    }
    Ok(())
}
