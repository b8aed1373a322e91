//! Image acquisition
//!
//! Resolves an `ImageRef` to raw bytes. A failure here is transient from the
//! pipeline's point of view: the single image is reported as ignored and its
//! siblings carry on.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::ImageRef;

/// Fetches the bytes of a referenced image
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn resolve(&self, image: &ImageRef) -> Result<Vec<u8>>;
}

/// In-memory image source keyed by file id
#[derive(Clone, Default)]
pub struct MemoryImageSource {
    images: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes for a file id
    pub fn insert(&self, file_id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.images
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_id.into(), bytes.into());
    }
}

#[async_trait]
impl ImageSource for MemoryImageSource {
    async fn resolve(&self, image: &ImageRef) -> Result<Vec<u8>> {
        self.images
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&image.file_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("image {}", image.file_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemoryImageSource::new();
        source.insert("f1", b"bytes".to_vec());

        let found = source.resolve(&ImageRef::photo("f1", "u1")).await.unwrap();
        assert_eq!(found, b"bytes");

        let missing = source.resolve(&ImageRef::photo("f2", "u2")).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }
}
