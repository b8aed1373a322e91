//! Telegram Bot API adapter
//!
//! Implements both collaborator seams on top of the Bot HTTP API:
//! `ImageSource` (`getFile` + file download) and `MessageGateway`
//! (`sendMessage`, `sendDocument`). Inbound `Update` payloads are converted
//! into `Submission`s.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::acquire::ImageSource;
use crate::error::{Error, Result};
use crate::gateway::MessageGateway;
use crate::models::{ImageRef, Submission};

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> Result<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(Error::Gateway(format!(
                "{} failed: {}",
                method,
                self.description.unwrap_or_else(|| "no description".into())
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    #[serde(default)]
    file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    http_client: Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str) -> Self {
        Self {
            http_client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    /// Server-side path of a file, needed for the download URL
    async fn file_path(&self, file_id: &str) -> Result<String> {
        let response: ApiResponse<FileInfo> = self
            .http_client
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await?
            .json()
            .await?;

        response
            .into_result("getFile")?
            .file_path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Gateway(format!("no file path for {}", file_id)))
    }
}

#[async_trait]
impl ImageSource for TelegramClient {
    async fn resolve(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let path = self.file_path(&image.file_id).await?;
        let bytes = self
            .http_client
            .get(self.file_url(&path))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        debug!(file_id = %image.file_id, size = bytes.len(), "Image downloaded");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl MessageGateway for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let response: ApiResponse<serde_json::Value> = self
            .http_client
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await?
            .json()
            .await?;
        response.into_result("sendMessage").map(|_| ())
    }

    async fn send_document(&self, chat_id: i64, bytes: Vec<u8>, filename: &str) -> Result<()> {
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", Part::bytes(bytes).file_name(filename.to_string()));

        let response: ApiResponse<serde_json::Value> = self
            .http_client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        response.into_result("sendDocument").map(|_| ())
    }
}

// ============================================================================
// Inbound updates
// ============================================================================

/// Webhook payload; only the fields the service reads
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub media_group_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Sizes of one photo, smallest first
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_unique_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_unique_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Update {
    /// Convert to a submission; `None` for updates that carry no message
    pub fn into_submission(self) -> Option<Submission> {
        let message = self.message?;

        let mut images = Vec::new();
        if let Some(largest) = message.photo.and_then(|sizes| sizes.into_iter().last()) {
            images.push(ImageRef::photo(largest.file_id, largest.file_unique_id));
        }
        if let Some(doc) = message.document {
            let name = doc
                .file_name
                .unwrap_or_else(|| doc.file_unique_id.clone());
            images.push(ImageRef::document(doc.file_id, doc.file_unique_id, name));
        }

        Some(Submission {
            chat_id: message.chat.id,
            username: message.from.and_then(|u| u.username),
            group_id: message.media_group_id,
            images,
            text: message.text,
        })
    }
}
