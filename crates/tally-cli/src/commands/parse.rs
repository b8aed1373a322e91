//! Amount parser playground

use anyhow::Result;
use tally_core::parse_amount;

pub fn cmd_parse(text: &str) -> Result<()> {
    match parse_amount(text) {
        Some(amount) => println!("✅ {}", amount),
        None => println!("❌ No amount found"),
    }
    Ok(())
}
