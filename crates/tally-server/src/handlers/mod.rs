//! HTTP request handlers organized by area

pub mod health;
pub mod submissions;
pub mod webhook;

// Re-export all handlers for use in router
pub use health::*;
pub use submissions::*;
pub use webhook::*;
