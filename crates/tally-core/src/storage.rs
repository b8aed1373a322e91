//! Durable file region shared by the user directory and the collection registry
//!
//! Both files are small, read fully and rewritten wholesale on every
//! mutation. One coarse lock serializes all of those reads and rewrites.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;

/// Coarse lock over the durable files
#[derive(Clone, Default)]
pub struct FileRegion {
    lock: Arc<Mutex<()>>,
}

impl FileRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the region; a poisoned lock is recovered since the guarded
    /// data is the files themselves
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read all non-empty lines of `path`, or nothing if the file is missing
pub(crate) fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Replace the contents of `path` with `lines`, creating parent directories
pub(crate) fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content)?;
    Ok(())
}
