//! Mock extractor for testing
//!
//! Returns scripted texts in call order, then falls back to a fixed text.
//! A scripted `None` simulates an OCR engine failure for that call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::TextExtractor;

#[derive(Clone, Default)]
pub struct MockExtractor {
    script: Arc<Mutex<VecDeque<Option<String>>>>,
    fallback: String,
    /// Whether health_check should return true
    pub healthy: bool,
}

impl MockExtractor {
    /// Always return `text`
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            script: Arc::default(),
            fallback: text.into(),
            healthy: true,
        }
    }

    /// Return `texts` one per call, then empty text
    pub fn scripted<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = texts.into_iter().map(|t| Some(t.into())).collect();
        Self {
            script: Arc::new(Mutex::new(script)),
            fallback: String::new(),
            healthy: true,
        }
    }

    /// Queue a failing call
    pub fn push_failure(&self) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(None);
    }

    /// Queue a successful call
    pub fn push_text(&self, text: impl Into<String>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Some(text.into()));
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn extract_text(&self, _image: &[u8]) -> Result<String> {
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Some(text)) => Ok(text),
            Some(None) => Err(Error::Extraction("mock OCR failure".into())),
            None => Ok(self.fallback.clone()),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_empty() {
        let mock = MockExtractor::scripted(["one", "two"]);
        assert_eq!(mock.extract_text(b"x").await.unwrap(), "one");
        assert_eq!(mock.extract_text(b"x").await.unwrap(), "two");
        assert_eq!(mock.extract_text(b"x").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_failure_is_scripted() {
        let mock = MockExtractor::fixed("fallback");
        mock.push_failure();
        assert!(mock.extract_text(b"x").await.is_err());
        assert_eq!(mock.extract_text(b"x").await.unwrap(), "fallback");
    }
}
