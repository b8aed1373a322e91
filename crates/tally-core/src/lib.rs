//! Tally Core Library
//!
//! Receipt collection for city-based groups of participants:
//! - Amount parser for OCR text of ride and subscription receipts
//! - Per-user, per-period ledger on the filesystem
//! - Registry of active collection periods, one per city
//! - Debounced batching of image bursts with at-most-once processing
//! - Pluggable text extraction backends (Ollama vision, mock)
//! - Telegram Bot API adapter for inbound updates and replies
//! - Message routing for registration, commands and typed amounts

pub mod acquire;
pub mod amount;
pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod service;
pub mod storage;
pub mod stores;
pub mod telegram;
pub mod users;

pub use acquire::{ImageSource, MemoryImageSource};
pub use amount::{parse_amount, parse_manual_amount};
pub use batch::{BatchAggregator, FlushedGroup, GroupState, SubmitOutcome};
pub use config::Config;
pub use error::{Error, Result};
pub use extract::{ExtractorClient, MockExtractor, OllamaExtractor, TextExtractor};
pub use gateway::{MessageGateway, RecordingGateway, SentMessage};
pub use ledger::LedgerStore;
pub use models::{
    CollectionKey, ImageKind, ImageOutcome, ImageRef, ImageResult, LedgerEntry, LedgerKind,
    Submission, UserAccount, UserSummary,
};
pub use pipeline::{Collaborators, GroupProcessor};
pub use registry::CollectionRegistry;
pub use report::Report;
pub use service::ReceiptService;
pub use stores::Stores;
pub use telegram::{TelegramClient, Update};
pub use users::UserDirectory;
