//! Outbound side of the messaging transport

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::Result;

/// Sends replies back to users
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    async fn send_document(&self, chat_id: i64, bytes: Vec<u8>, filename: &str) -> Result<()>;
}

/// A message captured by `RecordingGateway`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Text { chat_id: i64, text: String },
    Document { chat_id: i64, filename: String, bytes: Vec<u8> },
}

impl SentMessage {
    pub fn chat_id(&self) -> i64 {
        match self {
            Self::Text { chat_id, .. } | Self::Document { chat_id, .. } => *chat_id,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            Self::Document { .. } => None,
        }
    }
}

/// Gateway that keeps every message in memory
///
/// Used by tests and by `serve` when no bot token is configured.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Texts sent to one chat, in order
    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id() == chat_id)
            .filter_map(|m| m.text().map(String::from))
            .collect()
    }

    fn push(&self, message: SentMessage) {
        tracing::debug!(chat_id = message.chat_id(), "Recorded outbound message");
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

#[async_trait]
impl MessageGateway for RecordingGateway {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.push(SentMessage::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, bytes: Vec<u8>, filename: &str) -> Result<()> {
        self.push(SentMessage::Document {
            chat_id,
            filename: filename.to_string(),
            bytes,
        });
        Ok(())
    }
}
