//! Shared handles to the durable stores and the aggregator
//!
//! One `Stores` is opened per process and cloned into every component that
//! needs it. The user list and the collection registry share one
//! `FileRegion`, so their rewrites never interleave.

use std::sync::Arc;

use tracing::info;

use crate::batch::BatchAggregator;
use crate::config::Config;
use crate::error::Result;
use crate::ledger::LedgerStore;
use crate::registry::CollectionRegistry;
use crate::storage::FileRegion;
use crate::users::UserDirectory;

#[derive(Clone)]
pub struct Stores {
    pub users: UserDirectory,
    pub registry: Arc<CollectionRegistry>,
    pub ledger: LedgerStore,
    pub aggregator: Arc<BatchAggregator>,
}

impl Stores {
    /// Open every store under the configured data directory
    pub fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(config.data_dir())?;
        std::fs::create_dir_all(config.reports_dir())?;

        let region = FileRegion::new();
        let users = UserDirectory::new(config.users_file(), region.clone());
        let registry = CollectionRegistry::load(config.registry_file(), region)?;
        let ledger = LedgerStore::new(config.reports_dir(), config.decimal_separator);

        info!(
            data_dir = %config.data_dir().display(),
            active_collections = registry.len(),
            "Stores opened"
        );

        Ok(Self {
            users,
            registry: Arc::new(registry),
            ledger,
            aggregator: Arc::new(BatchAggregator::new(config.idle_threshold)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CollectionKey;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_layout_and_reloads_registry() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_data_dir(dir.path());

        let stores = Stores::open(&config).unwrap();
        assert!(config.reports_dir().is_dir());
        stores.registry.open(&CollectionKey::new("Minsk", "march")).unwrap();

        let reopened = Stores::open(&config).unwrap();
        assert_eq!(
            reopened.registry.find_active("Minsk"),
            Some(CollectionKey::new("Minsk", "march"))
        );
        assert!(reopened.aggregator.is_empty());
    }
}
