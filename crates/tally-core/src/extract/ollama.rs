//! Ollama vision backend
//!
//! Asks a local vision model to transcribe the receipt verbatim. The amount
//! parser then runs over the transcription exactly as it would over
//! Tesseract output.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::TextExtractor;

const TRANSCRIBE_PROMPT: &str = "Transcribe all text visible in this receipt image exactly as printed, \
line by line, in the original language. Do not summarize, translate or add anything.";

/// Request to Ollama API with images
#[derive(Debug, Serialize)]
struct OllamaVisionRequest {
    model: String,
    prompt: String,
    images: Vec<String>,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Clone)]
pub struct OllamaExtractor {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaExtractor {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextExtractor for OllamaExtractor {
    async fn extract_text(&self, image: &[u8]) -> Result<String> {
        if image.is_empty() {
            return Err(Error::Extraction("empty image".into()));
        }

        let request = OllamaVisionRequest {
            model: self.model.clone(),
            prompt: TRANSCRIBE_PROMPT.to_string(),
            images: vec![base64::engine::general_purpose::STANDARD.encode(image)],
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(
            model = %self.model,
            chars = ollama_response.response.len(),
            "Ollama transcription received"
        );

        Ok(ollama_response.response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let ex = OllamaExtractor::new("http://localhost:11434/", "llava");
        assert_eq!(ex.name(), "http://localhost:11434");
        assert_eq!(ex.model(), "llava");
    }

    #[tokio::test]
    async fn test_empty_image_rejected_without_request() {
        // Unroutable host: the call must fail before any network I/O
        let ex = OllamaExtractor::new("http://127.0.0.1:1", "llava");
        assert!(matches!(ex.extract_text(&[]).await, Err(Error::Extraction(_))));
    }
}
