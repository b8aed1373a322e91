//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `collections` - Collection period commands (list, open, close)
//! - `core` - Shared utilities (load_config, open_stores) and status
//! - `ledger` - Ledger read commands (info, total, report)
//! - `parse` - Amount parser playground
//! - `serve` - Web server command
//! - `users` - Participant management commands

pub mod collections;
pub mod core;
pub mod ledger;
pub mod parse;
pub mod serve;
pub mod users;

// Re-export command functions for main.rs
pub use collections::*;
pub use core::*;
pub use ledger::*;
pub use parse::*;
pub use serve::*;
pub use users::*;
