//! Telegram transport: the narrow surface the core talks through, plus the
//! Bot API client implementing it with long polling.

pub mod types;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use types::{ApiResponse, Update};

/// One incoming item from the chat transport, reduced to what the core needs.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    /// Album token; absent for standalone submissions.
    pub media_group_id: Option<String>,
    pub kind: IncomingKind,
}

#[derive(Debug, Clone)]
pub enum IncomingKind {
    Text(String),
    /// Photo attachment; the file reference is the highest-resolution variant.
    Photo { file_id: String },
    /// Generic file attachment with its declared name and MIME type.
    Document {
        file_id: String,
        file_name: Option<String>,
        mime_type: Option<String>,
    },
}

/// Chat transport surface. Kept narrow so the core never sees the Bot API.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a plain text message to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Sends a local file as a document under the given delivery name.
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<()>;

    /// Fetches the raw bytes behind an incoming file reference.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Long-running receive loop; pushes incoming items until the receiver
    /// closes or the transport fails.
    async fn listen(&self, tx: mpsc::Sender<Incoming>) -> Result<()>;
}

const POLL_TIMEOUT_SECS: u64 = 50;

/// Telegram Bot API client.
pub struct TelegramApi {
    client: reqwest::Client,
    token: String,
}

impl TelegramApi {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        // The request timeout must outlast the long-poll window.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.token)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Telegram {method} request failed"))?;
        let api: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Telegram {method} returned invalid JSON"))?;
        if !api.ok {
            anyhow::bail!(
                "Telegram {method} error: {}",
                api.description.unwrap_or_else(|| "unknown".to_string())
            );
        }
        api.result
            .ok_or_else(|| anyhow::anyhow!("Telegram {method} returned no result"))
    }

    /// Verifies the bot token against `getMe`.
    pub async fn check_token(&self) -> Result<()> {
        let me: serde_json::Value = self.call("getMe", &serde_json::json!({})).await?;
        let username = me
            .get("username")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        tracing::info!("Authenticated to Telegram as @{username}");
        Ok(())
    }

    fn incoming_from_update(update: Update) -> Option<Incoming> {
        let message = update.message?;
        let from = message.from?;

        let kind = if let Some(photo) = message.photo.filter(|variants| !variants.is_empty()) {
            let largest = photo
                .into_iter()
                .max_by_key(|p| u64::from(p.width) * u64::from(p.height))?;
            IncomingKind::Photo {
                file_id: largest.file_id,
            }
        } else if let Some(document) = message.document {
            IncomingKind::Document {
                file_id: document.file_id,
                file_name: document.file_name,
                mime_type: document.mime_type,
            }
        } else if let Some(text) = message.text {
            IncomingKind::Text(text)
        } else {
            return None;
        };

        Some(Incoming {
            user_id: from.id,
            chat_id: message.chat.id,
            username: from.username,
            media_group_id: message.media_group_id,
            kind,
        })
    }
}

#[async_trait]
impl Transport for TelegramApi {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &serde_json::json!({ "chat_id": chat_id, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read document {}", path.display()))?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .context("Invalid document MIME type")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", part);

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .context("Telegram sendDocument request failed")?;
        let api: ApiResponse<serde_json::Value> = response
            .json()
            .await
            .context("Telegram sendDocument returned invalid JSON")?;
        if !api.ok {
            anyhow::bail!(
                "Telegram sendDocument error: {}",
                api.description.unwrap_or_else(|| "unknown".to_string())
            );
        }
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let file: types::File = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;
        let file_path = file
            .file_path
            .ok_or_else(|| anyhow::anyhow!("Telegram getFile returned no file_path"))?;

        let url = format!("https://api.telegram.org/file/bot{}/{file_path}", self.token);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Telegram file download failed")?;
        if !response.status().is_success() {
            anyhow::bail!("Telegram file download failed: HTTP {}", response.status());
        }
        let bytes = response
            .bytes()
            .await
            .context("Telegram file download body read failed")?;
        Ok(bytes.to_vec())
    }

    async fn listen(&self, tx: mpsc::Sender<Incoming>) -> Result<()> {
        let mut offset: i64 = 0;
        loop {
            let body = serde_json::json!({
                "timeout": POLL_TIMEOUT_SECS,
                "offset": offset,
                "allowed_updates": ["message"],
            });
            let updates: Vec<Update> = self.call("getUpdates", &body).await?;
            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(incoming) = Self::incoming_from_update(update) {
                    if tx.send(incoming).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
