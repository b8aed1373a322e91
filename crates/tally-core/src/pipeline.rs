//! Processing of flushed image groups
//!
//! Each image of a group goes through acquire, store, extract, parse and
//! ledger append, in arrival order. Every image yields exactly one
//! `ImageResult`; a failure on one image never aborts its siblings. Once the
//! whole group has been handled the sender gets one consolidated reply and
//! the group is removed from the aggregator, whatever the outcome.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::acquire::ImageSource;
use crate::amount::parse_amount;
use crate::batch::FlushedGroup;
use crate::error::{Error, Result};
use crate::extract::TextExtractor;
use crate::gateway::MessageGateway;
use crate::models::{CollectionKey, ImageOutcome, ImageRef, ImageResult, UserAccount};
use crate::stores::Stores;

pub const NOT_ACTIVE_TEXT: &str =
    "Receipt collection is not active. Wait until an administrator starts it.";
pub const NOT_REGISTERED_TEXT: &str = "You are not registered. Please start with /start.";

/// The external collaborators a processing pass talks to
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn ImageSource>,
    pub extractor: Arc<dyn TextExtractor>,
    pub gateway: Arc<dyn MessageGateway>,
}

#[derive(Clone)]
pub struct GroupProcessor {
    stores: Stores,
    collaborators: Collaborators,
}

impl GroupProcessor {
    pub fn new(stores: Stores, collaborators: Collaborators) -> Self {
        Self {
            stores,
            collaborators,
        }
    }

    /// Run one processing pass over a flushed group
    ///
    /// Returns the per-image results in arrival order. A group whose sender
    /// is unknown, or whose city has no active collection, is rejected whole
    /// and nothing is written. The group's aggregator state is removed in
    /// every case.
    pub async fn process(&self, group: FlushedGroup) -> Result<Vec<ImageResult>> {
        let result = self.process_images(&group).await;
        self.stores.aggregator.remove(&group.group_id);

        match &result {
            Ok(results) => {
                info!(
                    group = %group.group_id,
                    chat_id = group.chat_id,
                    images = results.len(),
                    "Group processed"
                );
                if !results.is_empty() {
                    self.reply(group.chat_id, &summary_text(results)).await;
                }
            }
            Err(Error::CollectionNotActive(city)) => {
                warn!(group = %group.group_id, %city, "Group rejected, no active collection");
                self.reply(group.chat_id, NOT_ACTIVE_TEXT).await;
            }
            Err(Error::NotRegistered(chat_id)) => {
                warn!(group = %group.group_id, chat_id, "Group rejected, sender not registered");
                self.reply(group.chat_id, NOT_REGISTERED_TEXT).await;
            }
            Err(e) => {
                warn!(group = %group.group_id, error = %e, "Group processing failed");
                self.reply(group.chat_id, "Your images could not be processed. Please try again later.")
                    .await;
            }
        }

        result
    }

    async fn process_images(&self, group: &FlushedGroup) -> Result<Vec<ImageResult>> {
        let user = self
            .stores
            .users
            .find_by_chat(group.chat_id)?
            .ok_or(Error::NotRegistered(group.chat_id))?;
        let key = self.stores.registry.require_active(&user.city)?;

        let mut results = Vec::with_capacity(group.images.len());
        for image in &group.images {
            results.push(self.process_image(&key, &user, image).await);
        }
        Ok(results)
    }

    async fn process_image(&self, key: &CollectionKey, user: &UserAccount, image: &ImageRef) -> ImageResult {
        let name = match image.derived_name(user.chat_id) {
            Ok(name) => name,
            Err(e) => {
                warn!(unique_id = %image.unique_id, error = %e, "Cannot derive image name");
                return ImageResult {
                    name: image.unique_id.clone(),
                    outcome: ImageOutcome::Failed("bad file name".into()),
                };
            }
        };
        let outcome = self.image_outcome(key, user, image, &name).await;
        debug!(image = %name, ?outcome, "Image processed");
        ImageResult { name, outcome }
    }

    async fn image_outcome(
        &self,
        key: &CollectionKey,
        user: &UserAccount,
        image: &ImageRef,
        name: &str,
    ) -> ImageOutcome {
        let bytes = match self.collaborators.source.resolve(image).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(image = %name, error = %e, "Image download failed");
                return ImageOutcome::Failed("download failed".into());
            }
        };

        match self.stores.ledger.store_image(key, user, name, &bytes) {
            Ok(_) => {}
            Err(Error::Duplicate(_)) => return ImageOutcome::Duplicate,
            Err(e) => {
                warn!(image = %name, error = %e, "Image could not be saved");
                return ImageOutcome::Failed("could not save".into());
            }
        }

        let text = match self.collaborators.extractor.extract_text(&bytes).await {
            Ok(text) => text,
            Err(e) => {
                warn!(image = %name, error = %e, "Text extraction failed");
                return ImageOutcome::NotFound;
            }
        };

        let Some(amount) = parse_amount(&text) else {
            return ImageOutcome::NotFound;
        };

        let today = Local::now().date_naive();
        match self.stores.ledger.append_auto(key, user, amount, today) {
            Ok(()) => ImageOutcome::Recorded(amount),
            Err(e) => {
                warn!(image = %name, error = %e, "Ledger append failed");
                ImageOutcome::Failed("could not record amount".into())
            }
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.collaborators.gateway.send_text(chat_id, text).await {
            warn!(chat_id, error = %e, "Failed to send reply");
        }
    }
}

/// Newline-joined per-image lines, in order
pub fn summary_text(results: &[ImageResult]) -> String {
    results
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::MemoryImageSource;
    use crate::config::Config;
    use crate::extract::ExtractorClient;
    use crate::gateway::RecordingGateway;
    use rust_decimal::Decimal;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        stores: Stores,
        source: MemoryImageSource,
        gateway: RecordingGateway,
        user: UserAccount,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let stores = Stores::open(&Config::with_data_dir(dir.path())).unwrap();
        let user: UserAccount = "ivan 42 Ivan Petrov Minsk false".parse().unwrap();
        stores.users.upsert(user.clone()).unwrap();
        stores.registry.open(&CollectionKey::new("Minsk", "march")).unwrap();
        Fixture {
            _dir: dir,
            stores,
            source: MemoryImageSource::new(),
            gateway: RecordingGateway::new(),
            user,
        }
    }

    fn processor(f: &Fixture, extractor: ExtractorClient) -> GroupProcessor {
        GroupProcessor::new(
            f.stores.clone(),
            Collaborators {
                source: Arc::new(f.source.clone()),
                extractor: Arc::new(extractor),
                gateway: Arc::new(f.gateway.clone()),
            },
        )
    }

    fn flush(f: &Fixture, group_id: &str, images: &[ImageRef]) -> FlushedGroup {
        let start = Instant::now();
        for image in images {
            f.stores.aggregator.submit(group_id, 42, image.clone(), start);
        }
        let mut groups = f.stores.aggregator.take_idle(start + Duration::from_secs(60));
        assert_eq!(groups.len(), 1);
        groups.remove(0)
    }

    #[tokio::test]
    async fn test_mixed_outcomes_keep_order() {
        let f = fixture();
        f.source.insert("a", b"img-a".to_vec());
        f.source.insert("c", b"img-c".to_vec());
        // "b" is never registered, so its download fails
        let images = [
            ImageRef::photo("a", "ua"),
            ImageRef::photo("b", "ub"),
            ImageRef::photo("c", "uc"),
        ];
        let group = flush(&f, "album", &images);
        let p = processor(&f, ExtractorClient::scripted(["Total cost: 120", "blurry"]));

        let results = p.process(group).await.unwrap();
        let outcomes: Vec<_> = results.iter().map(|r| r.outcome.clone()).collect();
        assert_eq!(
            outcomes,
            vec![
                ImageOutcome::Recorded(Decimal::from(120)),
                ImageOutcome::Failed("download failed".into()),
                ImageOutcome::NotFound,
            ]
        );
        assert_eq!(results[0].name, "42_ua.jpg");

        let texts = f.gateway.texts_to(42);
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].lines().count(), 3);
        assert!(f.stores.aggregator.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_group_writes_nothing() {
        let f = fixture();
        f.source.insert("a", b"img".to_vec());
        let group = flush(&f, "album", &[ImageRef::photo("a", "ua")]);
        f.stores.registry.close(&CollectionKey::new("Minsk", "march")).unwrap();

        let p = processor(&f, ExtractorClient::scripted(["Total cost: 99"]));
        let err = p.process(group).await.unwrap_err();
        assert!(matches!(err, Error::CollectionNotActive(_)));

        let key = CollectionKey::new("Minsk", "march");
        assert!(!f.stores.ledger.user_dir(&key, &f.user).exists());
        assert_eq!(f.gateway.texts_to(42), vec![NOT_ACTIVE_TEXT]);
        assert!(f.stores.aggregator.is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_is_not_found() {
        let f = fixture();
        f.source.insert("a", b"img".to_vec());
        let group = flush(&f, "g", &[ImageRef::photo("a", "ua")]);

        let mock = crate::extract::MockExtractor::fixed("Total cost: 50");
        mock.push_failure();
        let p = processor(&f, ExtractorClient::Mock(mock));

        let results = p.process(group).await.unwrap();
        assert_eq!(results[0].outcome, ImageOutcome::NotFound);
        let key = CollectionKey::new("Minsk", "march");
        assert!(f.stores.ledger.user_dir(&key, &f.user).join("42_ua.jpg").exists());
    }

    #[tokio::test]
    async fn test_unknown_sender_rejected() {
        let f = fixture();
        let start = Instant::now();
        f.stores
            .aggregator
            .submit("g", 7, ImageRef::photo("a", "ua"), start);
        let group = f
            .stores
            .aggregator
            .take_idle(start + Duration::from_secs(60))
            .remove(0);

        let p = processor(&f, ExtractorClient::scripted(Vec::<String>::new()));
        assert!(matches!(p.process(group).await, Err(Error::NotRegistered(7))));
        assert_eq!(f.gateway.texts_to(7), vec![NOT_REGISTERED_TEXT]);
    }

    #[test]
    fn test_summary_text() {
        let results = vec![
            ImageResult {
                name: "x".into(),
                outcome: ImageOutcome::Recorded(Decimal::from(5)),
            },
            ImageResult {
                name: "y".into(),
                outcome: ImageOutcome::Duplicate,
            },
        ];
        assert_eq!(summary_text(&results), "x: 5 recorded\ny: duplicate ignored");
    }
}
