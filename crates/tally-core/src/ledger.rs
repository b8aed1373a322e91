//! Per-user, per-period ledger on the filesystem
//!
//! Layout:
//!
//! ```text
//! <reports_root>/<city>/<period>/<lastname_firstname>/
//!     auto_checks.txt      one "<amount> <YYYY-MM-DD>" line per parsed image
//!     manual_checks.txt    one line per typed amount
//!     <chatId>_<name>.jpg  stored receipt images
//! ```
//!
//! Ledger files are append-only. Amounts are written with the configured
//! decimal separator and read back accepting either `.` or `,`.
//!
//! Files of one user are not individually locked. Writes for a user funnel
//! through that user's flushed group, and a user normally has one burst open
//! at a time, so concurrent appends to the same file are an accepted residual
//! risk rather than a guarantee.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::amount::{format_amount, parse_stored_amount};
use crate::error::{Error, Result};
use crate::models::{is_supported_image, CollectionKey, LedgerEntry, LedgerKind, UserAccount, UserSummary};

#[derive(Clone)]
pub struct LedgerStore {
    root: PathBuf,
    separator: char,
}

impl LedgerStore {
    /// Create a store rooted at `root`, writing amounts with `separator`
    pub fn new(root: impl Into<PathBuf>, separator: char) -> Self {
        Self {
            root: root.into(),
            separator,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one collection period
    pub fn period_dir(&self, key: &CollectionKey) -> PathBuf {
        self.root.join(&key.city).join(&key.period)
    }

    /// Directory of one user within a collection period
    pub fn user_dir(&self, key: &CollectionKey, user: &UserAccount) -> PathBuf {
        self.period_dir(key).join(user.folder_name())
    }

    /// Append an amount parsed from an image
    ///
    /// Equal amounts from different images are legitimate and all kept.
    pub fn append_auto(
        &self,
        key: &CollectionKey,
        user: &UserAccount,
        amount: Decimal,
        date: NaiveDate,
    ) -> Result<()> {
        self.append(key, user, LedgerKind::Auto, amount, date)
    }

    /// Append an amount typed by the user
    pub fn append_manual(
        &self,
        key: &CollectionKey,
        user: &UserAccount,
        amount: Decimal,
        date: NaiveDate,
    ) -> Result<()> {
        self.append(key, user, LedgerKind::Manual, amount, date)
    }

    fn append(
        &self,
        key: &CollectionKey,
        user: &UserAccount,
        kind: LedgerKind,
        amount: Decimal,
        date: NaiveDate,
    ) -> Result<()> {
        let dir = self.user_dir(key, user);
        fs::create_dir_all(&dir)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(kind.file_name()))?;
        writeln!(
            file,
            "{} {}",
            format_amount(amount, self.separator),
            date.format("%Y-%m-%d")
        )?;

        debug!(chat_id = user.chat_id, %kind, %amount, "Ledger entry appended");
        Ok(())
    }

    /// Entries of one ledger sequence, oldest first
    pub fn entries(
        &self,
        key: &CollectionKey,
        user: &UserAccount,
        kind: LedgerKind,
    ) -> Result<Vec<LedgerEntry>> {
        read_entries(&self.user_dir(key, user).join(kind.file_name()))
    }

    /// Amount counted for a user: the last manual entry if any, else the sum
    /// of auto entries, else `None`
    pub fn total_for(&self, key: &CollectionKey, user: &UserAccount) -> Result<Option<Decimal>> {
        let dir = self.user_dir(key, user);
        total_in(&dir)
    }

    /// Sum of `total_for` over the city's users that have a folder for the
    /// period; missing totals count as zero
    pub fn aggregate_city(&self, key: &CollectionKey, users: &[UserAccount]) -> Result<Decimal> {
        let mut total = Decimal::ZERO;
        for user in users.iter().filter(|u| u.city == key.city) {
            let dir = self.user_dir(key, user);
            if !dir.is_dir() {
                continue;
            }
            total += total_in(&dir)?.unwrap_or(Decimal::ZERO);
        }
        Ok(total)
    }

    /// Figures for one user, or `None` if the user has no folder yet
    pub fn summary(&self, key: &CollectionKey, user: &UserAccount) -> Result<Option<UserSummary>> {
        self.folder_summary(key, &user.folder_name())
    }

    /// Figures for one user folder of the period, or `None` if it is missing
    pub fn folder_summary(&self, key: &CollectionKey, folder: &str) -> Result<Option<UserSummary>> {
        let dir = self.period_dir(key).join(folder);
        if !dir.is_dir() {
            return Ok(None);
        }

        let auto = read_entries(&dir.join(LedgerKind::Auto.file_name()))?;
        let manual = read_entries(&dir.join(LedgerKind::Manual.file_name()))?;

        Ok(Some(UserSummary {
            folder: folder.to_string(),
            image_count: count_images(&dir)?,
            auto_total: auto.iter().map(|e| e.amount).sum(),
            last_manual: manual.last().map(|e| e.amount),
        }))
    }

    /// User folder names of a period, sorted
    pub fn user_folders(&self, key: &CollectionKey) -> Result<Vec<String>> {
        let dir = self.period_dir(key);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut folders = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    folders.push(name.to_string());
                }
            }
        }
        folders.sort();
        Ok(folders)
    }

    /// Store receipt image bytes under their derived name
    ///
    /// Never overwrites: an existing file with the same name yields
    /// `Error::Duplicate` and the original is left untouched.
    pub fn store_image(
        &self,
        key: &CollectionKey,
        user: &UserAccount,
        name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.user_dir(key, user);
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::Duplicate(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = file.write_all(bytes) {
            // Leave no partial file behind so a retry is not seen as a duplicate
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %remove_err, "Failed to remove partial image");
            }
            return Err(e.into());
        }

        debug!(path = %path.display(), size = bytes.len(), "Image stored");
        Ok(path)
    }

    /// Delete every file in the user's folder for the period
    ///
    /// Returns the number of files removed. The folder itself stays.
    pub fn clear_user(&self, key: &CollectionKey, user: &UserAccount) -> Result<usize> {
        let dir = self.user_dir(key, user);
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("folder {}", dir.display())));
        }

        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn total_in(dir: &Path) -> Result<Option<Decimal>> {
    let manual = read_entries(&dir.join(LedgerKind::Manual.file_name()))?;
    if let Some(last) = manual.last() {
        return Ok(Some(last.amount));
    }

    let auto = read_entries(&dir.join(LedgerKind::Auto.file_name()))?;
    if auto.is_empty() {
        return Ok(None);
    }
    Ok(Some(auto.iter().map(|e| e.amount).sum()))
}

fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_entry(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(path = %path.display(), line, error = %e, "Skipping malformed ledger line"),
        }
    }
    Ok(entries)
}

fn parse_entry(line: &str) -> Result<LedgerEntry> {
    let mut parts = line.split_whitespace();
    let amount = parts
        .next()
        .ok_or_else(|| Error::InvalidData("empty ledger line".into()))?;
    let amount = parse_stored_amount(amount)?;

    let date = parts
        .next()
        .ok_or_else(|| Error::InvalidData(format!("missing date in '{}'", line)))?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| Error::InvalidData(format!("bad date in '{}': {}", line, e)))?;

    Ok(LedgerEntry { amount, date })
}

fn count_images(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file()
            && entry.file_name().to_str().is_some_and(is_supported_image)
        {
            count += 1;
        }
    }
    Ok(count)
}
