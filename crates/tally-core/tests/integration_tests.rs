//! Integration tests for tally-core
//!
//! These tests exercise the full submit → debounce → process → ledger
//! workflow through the public API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tally_core::{
    CollectionKey, Collaborators, Config, ExtractorClient, GroupProcessor, ImageOutcome, ImageRef,
    MemoryImageSource, ReceiptService, RecordingGateway, Stores, Submission, UserAccount,
};
use tempfile::TempDir;

const CHAT: i64 = 42;

struct Harness {
    _dir: TempDir,
    stores: Stores,
    source: MemoryImageSource,
    gateway: RecordingGateway,
    user: UserAccount,
    key: CollectionKey,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let stores = Stores::open(&Config::with_data_dir(dir.path())).expect("Failed to open stores");

        let user: UserAccount = "ivan 42 Ivan Petrov Minsk false".parse().unwrap();
        stores.users.upsert(user.clone()).unwrap();
        let key = CollectionKey::new("Minsk", "march");
        stores.registry.open(&key).unwrap();

        Self {
            _dir: dir,
            stores,
            source: MemoryImageSource::new(),
            gateway: RecordingGateway::new(),
            user,
            key,
        }
    }

    fn collaborators(&self, extractor: ExtractorClient) -> Collaborators {
        Collaborators {
            source: Arc::new(self.source.clone()),
            extractor: Arc::new(extractor),
            gateway: Arc::new(self.gateway.clone()),
        }
    }

    fn service(&self) -> ReceiptService {
        ReceiptService::new(
            self.stores.clone(),
            self.collaborators(ExtractorClient::scripted(Vec::<String>::new())),
            ',',
            Vec::new(),
        )
    }

    fn processor(&self, texts: &[&str]) -> GroupProcessor {
        GroupProcessor::new(
            self.stores.clone(),
            self.collaborators(ExtractorClient::scripted(texts.iter().copied())),
        )
    }
}

fn album(group_id: &str, images: Vec<ImageRef>) -> Submission {
    Submission {
        chat_id: CHAT,
        group_id: Some(group_id.to_string()),
        images,
        ..Default::default()
    }
}

// =============================================================================
// Burst processing
// =============================================================================

#[tokio::test]
async fn test_burst_with_duplicate_is_processed_once() {
    let h = Harness::new();
    h.source.insert("fx", b"receipt-x".to_vec());
    h.source.insert("fy", b"receipt-y".to_vec());

    // X, Y, then X again as a separate message of the same album
    let service = h.service();
    service
        .handle(album("g1", vec![ImageRef::photo("fx", "X"), ImageRef::photo("fy", "Y")]))
        .await;
    service.handle(album("g1", vec![ImageRef::photo("fx", "X")])).await;
    assert_eq!(h.stores.aggregator.len(), 1);

    // Nothing is flushed before the idle threshold
    assert!(h.stores.aggregator.take_idle(Instant::now()).is_empty());

    let later = Instant::now() + Duration::from_secs(60);
    let mut groups = h.stores.aggregator.take_idle(later);
    assert_eq!(groups.len(), 1);
    assert!(h.stores.aggregator.take_idle(later).is_empty());

    let processor = h.processor(&["Total cost: 100", "Total cost: 200"]);
    let results = processor.process(groups.remove(0)).await.unwrap();

    let outcomes: Vec<_> = results.iter().map(|r| r.outcome.clone()).collect();
    assert_eq!(
        outcomes,
        vec![
            ImageOutcome::Recorded(Decimal::from(100)),
            ImageOutcome::Recorded(Decimal::from(200)),
            ImageOutcome::Duplicate,
        ]
    );
    assert_eq!(
        h.stores.ledger.total_for(&h.key, &h.user).unwrap(),
        Some(Decimal::from(300))
    );

    let replies = h.gateway.texts_to(CHAT);
    assert_eq!(replies.len(), 1);
    assert_eq!(
        replies[0],
        "42_X.jpg: 100 recorded\n42_Y.jpg: 200 recorded\n42_X.jpg: duplicate ignored"
    );

    // The group is gone; a late image with the same id starts fresh
    assert!(h.stores.aggregator.is_empty());
    service.handle(album("g1", vec![ImageRef::photo("fz", "Z")])).await;
    assert_eq!(h.stores.aggregator.len(), 1);
}

#[tokio::test]
async fn test_trailing_digit_correction_end_to_end() {
    let h = Harness::new();
    h.source.insert("f", b"receipt".to_vec());

    h.service()
        .handle(album("g", vec![ImageRef::photo("f", "U")]))
        .await;
    let group = h
        .stores
        .aggregator
        .take_idle(Instant::now() + Duration::from_secs(60))
        .remove(0);

    let results = h.processor(&["Total cost: 2502"]).process(group).await.unwrap();
    assert_eq!(results[0].outcome, ImageOutcome::Recorded(Decimal::from(250)));
}

// =============================================================================
// Registry gating
// =============================================================================

#[tokio::test]
async fn test_closed_collection_rejects_and_keeps_files() {
    let h = Harness::new();
    h.source.insert("f", b"receipt".to_vec());
    let service = h.service();

    service.handle(album("g", vec![ImageRef::photo("f", "A")])).await;
    let group = h
        .stores
        .aggregator
        .take_idle(Instant::now() + Duration::from_secs(60))
        .remove(0);
    h.processor(&["Total cost: 15"]).process(group).await.unwrap();

    h.stores.registry.close(&h.key).unwrap();

    // Submissions after closing are refused before reaching the aggregator
    service.handle(album("g2", vec![ImageRef::photo("f", "B")])).await;
    assert!(h.stores.aggregator.is_empty());
    assert!(h
        .gateway
        .texts_to(CHAT)
        .last()
        .unwrap()
        .contains("not active"));

    // Prior ledger files stay on disk
    assert_eq!(
        h.stores.ledger.total_for(&h.key, &h.user).unwrap(),
        Some(Decimal::from(15))
    );
}

// =============================================================================
// Totals
// =============================================================================

#[tokio::test]
async fn test_manual_amount_supersedes_auto_total() {
    let h = Harness::new();
    h.source.insert("f", b"receipt".to_vec());
    let service = h.service();

    service.handle(album("g", vec![ImageRef::photo("f", "A")])).await;
    let group = h
        .stores
        .aggregator
        .take_idle(Instant::now() + Duration::from_secs(60))
        .remove(0);
    h.processor(&["Total cost: 120"]).process(group).await.unwrap();

    service
        .handle(Submission {
            chat_id: CHAT,
            text: Some("99,50".into()),
            ..Default::default()
        })
        .await;

    assert_eq!(
        h.stores.ledger.total_for(&h.key, &h.user).unwrap(),
        Some(Decimal::new(9950, 2))
    );
    let city = h
        .stores
        .ledger
        .aggregate_city(&h.key, &h.stores.users.list().unwrap())
        .unwrap();
    assert_eq!(city, Decimal::new(9950, 2));
}
