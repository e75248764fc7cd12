//! Telegram Bot Integration
//!
//! Provides a long-polling interface to accept tasks remotely.
//! Messages from authorized users are enqueued on the task queue; replies and
//! produced files go back through [`TelegramApi`], which implements
//! [`ReplySink`].

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use sdk::errors::{EngineError, EngineErrorExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::agent::ReplySink;
use crate::config::TelegramConfig;
use crate::queue::TaskQueue;
use crate::transcriber::Transcriber;

/// Telegram's per-message text limit, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const PHOTO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

const HELP_TEXT: &str = "Send me a task in plain words (or as a voice note) and I will carry it out on this computer.\n\n\
Commands:\n\
/start  - Show this message\n\
/status - Show queue status\n\
/help   - Show this message";

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Deserialize, Debug)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
    pub from: Option<User>,
    pub voice: Option<AudioFile>,
    pub audio: Option<AudioFile>,
}

#[derive(Deserialize, Debug)]
pub struct Chat {
    pub id: i64,
}

#[derive(Deserialize, Debug)]
pub struct User {
    pub id: i64,
}

#[derive(Deserialize, Debug)]
pub struct AudioFile {
    pub file_id: String,
    pub mime_type: Option<String>,
}

#[derive(Deserialize, Debug)]
struct File {
    file_path: Option<String>,
}

/// Split `text` into chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || max_chars == 0 {
        return vec![text.to_string()];
    }
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| PHOTO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Thin client for the Bot API methods the bot uses.
#[derive(Clone)]
pub struct TelegramApi {
    base_url: String,
    file_url: String,
    client: Client,
}

impl std::fmt::Debug for TelegramApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // base_url embeds the bot token
        f.debug_struct("TelegramApi").finish_non_exhaustive()
    }
}

impl TelegramApi {
    pub fn new(api_base: &str, token: &str, poll_timeout: Duration) -> Result<Self> {
        let api_base = api_base.trim_end_matches('/');
        let client = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(30))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            base_url: format!("{}/bot{}", api_base, token),
            file_url: format!("{}/file/bot{}", api_base, token),
            client,
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body: ApiResponse<T> = response
            .json()
            .await
            .context("Failed to decode Telegram response")?;

        if !body.ok {
            return Err(anyhow!(
                "Telegram API error: {}",
                body.description.unwrap_or_else(|| "unknown".to_string())
            ));
        }
        body.result
            .ok_or_else(|| anyhow!("Telegram API returned no result"))
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let response = self
            .client
            .get(format!("{}/getUpdates", self.base_url))
            .query(&[("offset", offset), ("timeout", timeout_secs as i64)])
            .send()
            .await?;

        Self::decode(response).await
    }

    /// Send text, split into as many messages as the length limit requires.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        #[derive(Serialize)]
        struct SendMsgReq<'a> {
            chat_id: i64,
            text: &'a str,
        }

        for chunk in chunk_text(text, MAX_MESSAGE_CHARS) {
            let response = self
                .client
                .post(format!("{}/sendMessage", self.base_url))
                .json(&SendMsgReq {
                    chat_id,
                    text: &chunk,
                })
                .send()
                .await?;
            Self::decode::<serde_json::Value>(response).await?;
        }
        Ok(())
    }

    /// Upload a file: images as photos, everything else as a document.
    pub async fn send_file(&self, chat_id: i64, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let (method, field) = if is_photo(path) {
            ("sendPhoto", "photo")
        } else {
            ("sendDocument", "document")
        };

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field, Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .multipart(form)
            .send()
            .await?;
        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Download a file by its `file_id`.
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(format!("{}/getFile", self.base_url))
            .query(&[("file_id", file_id)])
            .send()
            .await?;
        let file: File = Self::decode(response).await?;
        let file_path = file
            .file_path
            .ok_or_else(|| anyhow!("Telegram did not return a file path"))?;

        let bytes = self
            .client
            .get(format!("{}/{}", self.file_url, file_path))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

fn chat_id(recipient: &str) -> Result<i64> {
    recipient
        .parse()
        .map_err(|_| anyhow!("Not a Telegram chat id: {}", recipient))
}

#[async_trait]
impl ReplySink for TelegramApi {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        self.send_message(chat_id(recipient)?, text).await
    }

    async fn send_file(&self, recipient: &str, path: &Path) -> Result<()> {
        TelegramApi::send_file(self, chat_id(recipient)?, path).await
    }
}

/// Long-polling bot that feeds the task queue.
pub struct TelegramBot {
    api: TelegramApi,
    allowed_users: Vec<i64>,
    poll_timeout_secs: u64,
    queue: TaskQueue,
    transcriber: Arc<Transcriber>,
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("allowed_users", &self.allowed_users)
            .finish()
    }
}

impl TelegramBot {
    pub fn new(
        api: TelegramApi,
        config: &TelegramConfig,
        queue: TaskQueue,
        transcriber: Arc<Transcriber>,
    ) -> Self {
        Self {
            api,
            allowed_users: config.allowed_users.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            queue,
            transcriber,
        }
    }

    pub fn api(&self) -> &TelegramApi {
        &self.api
    }

    /// Start the long-polling loop
    ///
    /// Runs until the future is dropped.
    pub async fn start_polling(&self) -> Result<()> {
        info!("Starting Telegram bot long-polling loop...");
        let mut offset = 0;

        loop {
            match self.api.get_updates(offset, self.poll_timeout_secs).await {
                Ok(updates) => {
                    for update in updates {
                        offset = update.update_id + 1;
                        if let Some(msg) = update.message {
                            self.handle_message(&msg).await;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %format!("{:#}", e), "Failed to fetch Telegram updates");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.contains(&user_id)
    }

    pub async fn handle_message(&self, msg: &Message) {
        let chat_id = msg.chat.id;

        let user_id = match msg.from.as_ref() {
            Some(u) => u.id,
            None => {
                warn!("Message with no user info - ignoring");
                return;
            }
        };

        if !self.is_allowed(user_id) {
            warn!(user_id, "Unauthorized user attempted to use the bot");
            self.reply(chat_id, "Unauthorized. Access denied.").await;
            return;
        }

        if let Some(text) = msg.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            info!(user_id, "Received text message");
            if text.starts_with('/') {
                self.handle_command(chat_id, text).await;
            } else {
                self.enqueue(chat_id, text).await;
            }
            return;
        }

        if let Some(audio) = msg.voice.as_ref().or(msg.audio.as_ref()) {
            info!(user_id, "Received voice message");
            self.handle_voice(chat_id, audio).await;
        }
    }

    async fn handle_voice(&self, chat_id: i64, audio: &AudioFile) {
        let mime_type = audio.mime_type.as_deref().unwrap_or("audio/ogg");

        let text = match self.api.download(&audio.file_id).await {
            Ok(bytes) => self.transcriber.transcribe(bytes, mime_type).await,
            Err(e) => Err(EngineError::Transport(format!("{:#}", e))),
        };

        match text {
            Ok(text) if !text.is_empty() => {
                self.reply(chat_id, &format!("Heard: {}", text)).await;
                self.enqueue(chat_id, &text).await;
            }
            Ok(_) => {
                self.reply(chat_id, "I could not make out any words in that voice note.")
                    .await;
            }
            Err(e) => {
                error!(error = %e, "Voice note handling failed");
                self.reply(chat_id, e.user_hint()).await;
            }
        }
    }

    async fn enqueue(&self, chat_id: i64, text: &str) {
        match self.queue.enqueue(&chat_id.to_string(), text).await {
            Ok(task_id) => {
                self.reply(chat_id, &format!("Queued as task #{}", task_id))
                    .await
            }
            Err(e) => {
                error!(error = %e, "Failed to enqueue task");
                let hint = EngineError::from(e).user_hint().to_string();
                self.reply(chat_id, &hint).await;
            }
        }
    }

    /// Handle built-in bot commands
    async fn handle_command(&self, chat_id: i64, cmd: &str) {
        let reply = match cmd.split_whitespace().next().unwrap_or("") {
            "/start" | "/help" => HELP_TEXT.to_string(),
            "/status" => match self.queue.counts().await {
                Ok(counts) => format!(
                    "Tasks: {} pending, {} running, {} done, {} failed",
                    counts.pending, counts.running, counts.done, counts.failed
                ),
                Err(e) => EngineError::from(e).user_hint().to_string(),
            },
            other => format!("Unknown command: {}", other),
        };

        self.reply(chat_id, &reply).await;
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.api.send_message(chat_id, text).await {
            error!(chat_id, error = %format!("{:#}", e), "Failed to send message");
        }
    }
}
