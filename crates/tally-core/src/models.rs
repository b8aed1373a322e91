//! Domain models for Tally

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Image extensions accepted for document submissions
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Check whether a file name carries one of the supported image extensions
pub fn is_supported_image(file_name: &str) -> bool {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Usable as a path component and as a single field of the data files
pub fn is_safe_name(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('.')
        && !s.contains(['/', '\\', '=', '\0'])
        && !s.chars().any(char::is_whitespace)
}

/// A registered participant
///
/// Owned by the user directory; the pipeline only reads `city` and the name
/// fields to compute folder paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub username: Option<String>,
    pub chat_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
    pub is_admin: bool,
}

impl UserAccount {
    /// Folder name under `city/period/` holding this user's files
    pub fn folder_name(&self) -> String {
        format!("{}_{}", self.last_name, self.first_name)
    }

    /// Display name, "First Last"
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Serialize to the six-field directory line
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.username.as_deref().unwrap_or("null"),
            self.chat_id,
            self.first_name,
            self.last_name,
            self.city,
            self.is_admin
        )
    }
}

fn parse_bool(s: &str) -> std::result::Result<bool, String> {
    match s.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("Invalid admin flag: {}", s)),
    }
}

impl FromStr for UserAccount {
    type Err = String;

    /// Parse a directory line
    ///
    /// Six fields: `username chatId firstName lastName city isAdmin`.
    /// Five fields is the legacy layout without a username.
    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (username, rest) = match parts.len() {
            6 => {
                let username = match parts[0] {
                    "null" | "" => None,
                    name => Some(name.to_string()),
                };
                (username, &parts[1..])
            }
            5 => (None, &parts[..]),
            n => return Err(format!("Expected 5 or 6 fields, found {}", n)),
        };

        let chat_id = rest[0]
            .parse::<i64>()
            .map_err(|e| format!("Invalid chat id '{}': {}", rest[0], e))?;

        Ok(Self {
            username,
            chat_id,
            first_name: rest[1].to_string(),
            last_name: rest[2].to_string(),
            city: rest[3].to_string(),
            is_admin: parse_bool(rest[4])?,
        })
    }
}

/// Composite key of a collection period
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionKey {
    pub city: String,
    pub period: String,
}

impl CollectionKey {
    pub fn new(city: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            period: period.into(),
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.city, self.period)
    }
}

/// The two independent ledger sequences kept per user per period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// Amounts parsed from receipt images
    Auto,
    /// Amounts typed by the user
    Manual,
}

impl LedgerKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Auto => "auto_checks.txt",
            Self::Manual => "manual_checks.txt",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of a ledger file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub amount: Decimal,
    pub date: NaiveDate,
}

/// How an image reached us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    #[default]
    Photo,
    Document,
}

/// Reference to an image held by the messaging provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Provider handle used to download the bytes
    pub file_id: String,
    /// Provider-assigned identifier, stable across re-sends of the same file
    pub unique_id: String,
    /// Original file name (documents only)
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub kind: ImageKind,
}

impl ImageRef {
    pub fn photo(file_id: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            unique_id: unique_id.into(),
            file_name: None,
            kind: ImageKind::Photo,
        }
    }

    pub fn document(
        file_id: impl Into<String>,
        unique_id: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            unique_id: unique_id.into(),
            file_name: Some(file_name.into()),
            kind: ImageKind::Document,
        }
    }

    /// Deterministic stored file name for this image
    ///
    /// Photos are named after the provider's unique id, documents after
    /// their original file name; both are prefixed with the sender's chat id.
    pub fn derived_name(&self, chat_id: i64) -> Result<String> {
        let base = match (self.kind, self.file_name.as_deref()) {
            (ImageKind::Document, Some(name)) => {
                let name = std::path::Path::new(name)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| Error::InvalidData(format!("Bad file name: {}", name)))?;
                name.to_string()
            }
            _ => format!("{}.jpg", self.unique_id),
        };

        if base.is_empty() || base.contains(['/', '\\']) || base.starts_with('.') {
            return Err(Error::InvalidData(format!("Bad image name: {}", base)));
        }

        Ok(format!("{}_{}", chat_id, base))
    }
}

/// One inbound message as delivered by the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub chat_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    /// Shared identifier of a multi-image burst
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Result of processing one image of a flushed group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ImageOutcome {
    /// An amount was parsed and appended to the auto ledger
    Recorded(Decimal),
    /// The image was stored but no amount could be read from it
    NotFound,
    /// An image with the same derived name is already stored
    Duplicate,
    /// The image could not be acquired or stored
    Failed(String),
}

/// Per-image line of a consolidated group summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageResult {
    /// Derived name, or the unique id when no name could be derived
    pub name: String,
    pub outcome: ImageOutcome,
}

impl fmt::Display for ImageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ImageOutcome::Recorded(amount) => write!(f, "{}: {} recorded", self.name, amount),
            ImageOutcome::NotFound => write!(f, "{}: amount not found", self.name),
            ImageOutcome::Duplicate => write!(f, "{}: duplicate ignored", self.name),
            ImageOutcome::Failed(reason) => write!(f, "{}: ignored ({})", self.name, reason),
        }
    }
}

/// Per-user figures for one collection period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub folder: String,
    pub image_count: usize,
    pub auto_total: Decimal,
    pub last_manual: Option<Decimal>,
}

impl UserSummary {
    /// Amount counted towards totals: last manual entry, else the auto sum
    pub fn effective_total(&self) -> Decimal {
        self.last_manual.unwrap_or(self.auto_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_six_field_user() {
        let user: UserAccount = "ivan 42 Ivan Petrov Minsk true".parse().unwrap();
        assert_eq!(user.username.as_deref(), Some("ivan"));
        assert_eq!(user.chat_id, 42);
        assert_eq!(user.folder_name(), "Petrov_Ivan");
        assert!(user.is_admin);
    }

    #[test]
    fn test_parse_legacy_five_field_user() {
        let user: UserAccount = "42 Ivan Petrov Minsk False".parse().unwrap();
        assert_eq!(user.username, None);
        assert_eq!(user.city, "Minsk");
        assert!(!user.is_admin);
    }

    #[test]
    fn test_null_username_round_trips_as_none() {
        let user: UserAccount = "null 7 Anna Ivanova Gomel false".parse().unwrap();
        assert_eq!(user.username, None);
        assert_eq!(user.to_line(), "null 7 Anna Ivanova Gomel false");
    }

    #[test]
    fn test_parse_user_rejects_bad_lines() {
        assert!("too few fields".parse::<UserAccount>().is_err());
        assert!("u notanumber A B C false".parse::<UserAccount>().is_err());
        assert!("u 1 A B C maybe".parse::<UserAccount>().is_err());
    }

    #[test]
    fn test_derived_name_photo_uses_unique_id() {
        let image = ImageRef::photo("file-abc", "uniq1");
        assert_eq!(image.derived_name(99).unwrap(), "99_uniq1.jpg");
    }

    #[test]
    fn test_derived_name_document_strips_directories() {
        let image = ImageRef::document("f", "u", "../../etc/receipt.png");
        assert_eq!(image.derived_name(5).unwrap(), "5_receipt.png");
    }

    #[test]
    fn test_supported_image_extensions() {
        assert!(is_supported_image("scan.JPG"));
        assert!(is_supported_image("a.webp"));
        assert!(!is_supported_image("report.pdf"));
        assert!(!is_supported_image("noext"));
    }

    #[test]
    fn test_collection_key_display() {
        assert_eq!(CollectionKey::new("Minsk", "march").to_string(), "Minsk-march");
    }

    #[test]
    fn test_image_result_lines() {
        let recorded = ImageResult {
            name: "X".into(),
            outcome: ImageOutcome::Recorded(Decimal::new(100, 0)),
        };
        let duplicate = ImageResult {
            name: "X".into(),
            outcome: ImageOutcome::Duplicate,
        };
        assert_eq!(recorded.to_string(), "X: 100 recorded");
        assert_eq!(duplicate.to_string(), "X: duplicate ignored");
    }
}
