//! Pluggable text extraction (OCR) backends
//!
//! The pipeline treats extraction as opaque: image bytes in, raw text out.
//! Empty or unreadable text simply flows into "amount not found".
//!
//! # Architecture
//!
//! - `TextExtractor` trait: the interface every backend implements
//! - `ExtractorClient` enum: concrete wrapper providing Clone + static dispatch
//! - Backends: `OllamaExtractor` (vision model transcription), `MockExtractor`
//!
//! # Configuration
//!
//! - `OCR_BACKEND`: `ollama` (default) or `mock`
//! - `OLLAMA_HOST`: Ollama server URL (required for the ollama backend)
//! - `OLLAMA_VISION_MODEL`: vision model name (default: llama3.2-vision)

mod mock;
mod ollama;

pub use mock::MockExtractor;
pub use ollama::OllamaExtractor;

use async_trait::async_trait;

use crate::config::ExtractorConfig;
use crate::error::Result;

/// Turns receipt image bytes into text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract all readable text from an image
    async fn extract_text(&self, image: &[u8]) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Backend name (for logging)
    fn name(&self) -> &str;
}

/// Concrete extractor enum
#[derive(Clone)]
pub enum ExtractorClient {
    /// Ollama vision model
    Ollama(OllamaExtractor),
    /// Scripted responses for tests and dry runs
    Mock(MockExtractor),
}

impl ExtractorClient {
    /// Build the configured backend
    ///
    /// Returns None if the ollama backend is selected but no host is set.
    pub fn from_config(config: &ExtractorConfig) -> Option<Self> {
        match config.backend.to_lowercase().as_str() {
            "mock" => Some(ExtractorClient::Mock(MockExtractor::fixed(""))),
            "ollama" => config
                .ollama_host
                .as_deref()
                .map(|host| ExtractorClient::Ollama(OllamaExtractor::new(host, &config.vision_model))),
            other => {
                tracing::warn!(backend = %other, "Unknown OCR_BACKEND, falling back to ollama");
                config
                    .ollama_host
                    .as_deref()
                    .map(|host| ExtractorClient::Ollama(OllamaExtractor::new(host, &config.vision_model)))
            }
        }
    }

    /// Create a mock that returns the given texts in order
    pub fn scripted<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExtractorClient::Mock(MockExtractor::scripted(texts))
    }
}

#[async_trait]
impl TextExtractor for ExtractorClient {
    async fn extract_text(&self, image: &[u8]) -> Result<String> {
        match self {
            ExtractorClient::Ollama(b) => b.extract_text(image).await,
            ExtractorClient::Mock(b) => b.extract_text(image).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            ExtractorClient::Ollama(b) => b.health_check().await,
            ExtractorClient::Mock(b) => b.health_check().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            ExtractorClient::Ollama(b) => b.name(),
            ExtractorClient::Mock(b) => b.name(),
        }
    }
}
