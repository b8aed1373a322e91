//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Collection already active for {city}: {period}")]
    CollectionActive { city: String, period: String },

    #[error("No active collection for {0}")]
    CollectionNotActive(String),

    #[error("Duplicate image: {0}")]
    Duplicate(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("User not registered: {0}")]
    NotRegistered(i64),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Text extraction error: {0}")]
    Extraction(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
