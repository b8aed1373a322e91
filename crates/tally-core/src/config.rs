//! Service configuration
//!
//! Values come from, in increasing priority:
//! 1. Built-in defaults
//! 2. A TOML file (`TALLY_CONFIG`, or `<data_dir>/config/tally.toml` if present)
//! 3. Environment variables
//!
//! ```toml
//! data_dir = "/var/lib/tally"
//! idle_threshold_secs = 5
//! tick_interval_secs = 2
//! decimal_separator = ","
//! cities = ["Minsk", "Gomel"]
//!
//! [telegram]
//! api_base = "https://api.telegram.org"
//!
//! [ocr]
//! backend = "ollama"
//! ollama_host = "http://localhost:11434"
//! vision_model = "llama3.2-vision"
//! ```
//!
//! Secrets (`TELEGRAM_BOT_TOKEN`, `TELEGRAM_WEBHOOK_SECRET`, `TALLY_API_KEYS`)
//! are only read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::is_safe_name;
use crate::registry::REGISTRY_FILE;
use crate::users::USERS_FILE;

const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 5;
const DEFAULT_TICK_INTERVAL_SECS: u64 = 2;
const DEFAULT_KEEPALIVE_MINUTES: u64 = 5;
const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";
const DEFAULT_VISION_MODEL: &str = "llama3.2-vision";

/// Telegram Bot API settings
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub api_base: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls
    pub webhook_secret: Option<String>,
}

/// Text extraction backend settings
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub backend: String,
    pub ollama_host: Option<String>,
    pub vision_model: String,
}

/// Periodic self-ping to keep a free-tier host awake
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    pub url: String,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Quiet time after the last image before a group is flushed
    pub idle_threshold: Duration,
    /// How often idle groups are scanned for
    pub tick_interval: Duration,
    /// Separator used when writing ledger amounts
    pub decimal_separator: char,
    /// Cities accepted at registration; empty accepts any
    pub cities: Vec<String>,
    pub telegram: TelegramConfig,
    pub extractor: ExtractorConfig,
    /// Bearer keys accepted by the submission endpoint
    pub api_keys: Vec<String>,
    pub keepalive: Option<KeepaliveConfig>,
}

/// On-disk shape of the config file; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    idle_threshold_secs: Option<u64>,
    tick_interval_secs: Option<u64>,
    decimal_separator: Option<String>,
    cities: Option<Vec<String>>,
    #[serde(default)]
    telegram: FileTelegram,
    #[serde(default)]
    ocr: FileOcr,
    #[serde(default)]
    keepalive: FileKeepalive,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileTelegram {
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOcr {
    backend: Option<String>,
    ollama_host: Option<String>,
    vision_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileKeepalive {
    url: Option<String>,
    minutes: Option<u64>,
}

/// Default data directory (~/.local/share/tally on Linux)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tally"))
        .unwrap_or_else(|| PathBuf::from("tally-data"))
}

impl Config {
    /// Load from the process environment and the config file, if any
    pub fn load() -> Result<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load using `env` as the environment lookup
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let explicit = env("TALLY_CONFIG").map(PathBuf::from);
        let candidate = explicit.clone().unwrap_or_else(|| {
            env("TALLY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir)
                .join("config")
                .join("tally.toml")
        });

        let file_text = if candidate.exists() {
            debug!(path = %candidate.display(), "Reading config file");
            Some(std::fs::read_to_string(&candidate)?)
        } else if let Some(path) = explicit {
            return Err(Error::Config(format!(
                "TALLY_CONFIG points to a missing file: {}",
                path.display()
            )));
        } else {
            None
        };

        Self::from_parts(file_text.as_deref(), env)
    }

    /// Build from optional TOML text and an environment lookup
    pub fn from_parts(file_text: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file: FileConfig = match file_text {
            Some(text) => toml::from_str(text)?,
            None => FileConfig::default(),
        };

        let data_dir = env("TALLY_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(default_data_dir);

        let idle_secs = secs(&env, "TALLY_IDLE_THRESHOLD_SECS")?
            .or(file.idle_threshold_secs)
            .unwrap_or(DEFAULT_IDLE_THRESHOLD_SECS);
        let tick_secs = secs(&env, "TALLY_TICK_INTERVAL_SECS")?
            .or(file.tick_interval_secs)
            .unwrap_or(DEFAULT_TICK_INTERVAL_SECS);
        if tick_secs == 0 {
            return Err(Error::Config("tick interval must be at least 1 second".into()));
        }

        let separator = env("TALLY_DECIMAL_SEPARATOR")
            .or(file.decimal_separator)
            .unwrap_or_else(|| ",".to_string());
        let decimal_separator = match separator.trim() {
            "," => ',',
            "." => '.',
            other => {
                return Err(Error::Config(format!(
                    "decimal separator must be ',' or '.', got '{}'",
                    other
                )))
            }
        };

        let cities = match env("TALLY_CITIES") {
            Some(list) => split_list(&list),
            None => file.cities.unwrap_or_default(),
        };
        // Cities become a users.txt field and a ledger directory name
        if let Some(city) = cities.iter().find(|c| !is_safe_name(c)) {
            return Err(Error::Config(format!(
                "city '{}' must be a single word without path characters",
                city
            )));
        }

        let telegram = TelegramConfig {
            token: env("TELEGRAM_BOT_TOKEN"),
            api_base: env("TELEGRAM_API_BASE")
                .or(file.telegram.api_base)
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API.to_string()),
            webhook_secret: env("TELEGRAM_WEBHOOK_SECRET"),
        };

        let extractor = ExtractorConfig {
            backend: env("OCR_BACKEND")
                .or(file.ocr.backend)
                .unwrap_or_else(|| "ollama".to_string()),
            ollama_host: env("OLLAMA_HOST").or(file.ocr.ollama_host),
            vision_model: env("OLLAMA_VISION_MODEL")
                .or(file.ocr.vision_model)
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
        };

        let api_keys = split_list(&env("TALLY_API_KEYS").unwrap_or_default());

        let keepalive = match env("TALLY_KEEPALIVE_URL").or(file.keepalive.url) {
            Some(url) => {
                let minutes = secs(&env, "TALLY_KEEPALIVE_MINUTES")?
                    .or(file.keepalive.minutes)
                    .unwrap_or(DEFAULT_KEEPALIVE_MINUTES);
                if minutes == 0 {
                    warn!("Keep-alive interval is 0, keep-alive disabled");
                    None
                } else {
                    Some(KeepaliveConfig {
                        url,
                        interval: Duration::from_secs(minutes * 60),
                    })
                }
            }
            None => None,
        };

        Ok(Self {
            data_dir,
            idle_threshold: Duration::from_secs(idle_secs),
            tick_interval: Duration::from_secs(tick_secs),
            decimal_separator,
            cities,
            telegram,
            extractor,
            api_keys,
            keepalive,
        })
    }

    /// Defaults rooted at `data_dir`, ignoring environment and files
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            idle_threshold: Duration::from_secs(DEFAULT_IDLE_THRESHOLD_SECS),
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            decimal_separator: ',',
            cities: Vec::new(),
            telegram: TelegramConfig {
                token: None,
                api_base: DEFAULT_TELEGRAM_API.to_string(),
                webhook_secret: None,
            },
            extractor: ExtractorConfig {
                backend: "ollama".to_string(),
                ollama_host: None,
                vision_model: DEFAULT_VISION_MODEL.to_string(),
            },
            api_keys: Vec::new(),
            keepalive: None,
        }
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join(USERS_FILE)
    }

    pub fn registry_file(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILE)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("Reports")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn secs(env: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>> {
    env(name)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("{} must be a whole number: {}", name, e)))
        })
        .transpose()
}
