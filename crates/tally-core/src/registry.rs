//! Collection registry
//!
//! Tracks which city has an open collection period. The in-memory map is the
//! source of truth during a run; `active_collections.txt` is a snapshot
//! loaded once at startup and rewritten wholesale after every mutation.
//!
//! File format, one entry per line: `<city>-<period>=<period>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::CollectionKey;
use crate::storage::{read_lines, write_lines, FileRegion};

/// Registry file name under the data directory
pub const REGISTRY_FILE: &str = "active_collections.txt";

/// Durable map of city → active collection period
pub struct CollectionRegistry {
    path: PathBuf,
    region: FileRegion,
    /// city → period; one active period per city
    active: RwLock<BTreeMap<String, String>>,
}

impl CollectionRegistry {
    /// Load the registry snapshot from `path`
    ///
    /// A missing file yields an empty registry. Malformed lines are skipped.
    pub fn load(path: impl Into<PathBuf>, region: FileRegion) -> Result<Self> {
        let path = path.into();
        let lines = {
            let _guard = region.lock();
            read_lines(&path)?
        };

        let mut active = BTreeMap::new();
        for line in lines {
            match parse_line(&line) {
                Some(key) => {
                    if let Some(previous) = active.insert(key.city.clone(), key.period.clone()) {
                        warn!(
                            city = %key.city,
                            previous = %previous,
                            period = %key.period,
                            "Duplicate city in registry file, keeping last"
                        );
                    }
                }
                None => warn!(line = %line, "Skipping malformed registry line"),
            }
        }

        info!(
            "Loaded {} active collection(s) from {}",
            active.len(),
            path.display()
        );

        Ok(Self {
            path,
            region,
            active: RwLock::new(active),
        })
    }

    /// Registry file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a collection period for a city
    ///
    /// Fails with `CollectionActive` if the city already has one. If the
    /// snapshot cannot be written the in-memory change is rolled back and the
    /// error returned.
    pub fn open(&self, key: &CollectionKey) -> Result<()> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(period) = active.get(&key.city) {
            return Err(Error::CollectionActive {
                city: key.city.clone(),
                period: period.clone(),
            });
        }

        active.insert(key.city.clone(), key.period.clone());
        if let Err(e) = self.persist(&active) {
            active.remove(&key.city);
            return Err(e);
        }

        info!(city = %key.city, period = %key.period, "Collection opened");
        Ok(())
    }

    /// Close a collection period
    ///
    /// Ledger files of the period stay on disk untouched.
    pub fn close(&self, key: &CollectionKey) -> Result<()> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);

        match active.get(&key.city) {
            Some(period) if *period == key.period => {}
            _ => return Err(Error::CollectionNotActive(key.to_string())),
        }

        active.remove(&key.city);
        if let Err(e) = self.persist(&active) {
            active.insert(key.city.clone(), key.period.clone());
            return Err(e);
        }

        info!(city = %key.city, period = %key.period, "Collection closed");
        Ok(())
    }

    /// Active collection for a city, if any
    pub fn find_active(&self, city: &str) -> Option<CollectionKey> {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        active
            .get(city)
            .map(|period| CollectionKey::new(city, period.clone()))
    }

    /// Active collection for a city, or `CollectionNotActive`
    pub fn require_active(&self, city: &str) -> Result<CollectionKey> {
        self.find_active(city)
            .ok_or_else(|| Error::CollectionNotActive(city.to_string()))
    }

    /// All active collections, ordered by city
    pub fn list(&self) -> Vec<CollectionKey> {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        active
            .iter()
            .map(|(city, period)| CollectionKey::new(city.clone(), period.clone()))
            .collect()
    }

    /// Number of active collections
    pub fn len(&self) -> usize {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, active: &BTreeMap<String, String>) -> Result<()> {
        let lines: Vec<String> = active
            .iter()
            .map(|(city, period)| format!("{}={}", CollectionKey::new(city.clone(), period.clone()), period))
            .collect();
        let _guard = self.region.lock();
        write_lines(&self.path, &lines)
    }
}

/// Parse `<city>-<period>=<period>` into a key
fn parse_line(line: &str) -> Option<CollectionKey> {
    let (key, period) = line.split_once('=')?;
    let period = period.trim();
    if period.is_empty() {
        return None;
    }
    let city = key.trim().strip_suffix(period)?.strip_suffix('-')?;
    if city.is_empty() {
        return None;
    }
    Some(CollectionKey::new(city, period))
}
