//! Telegram session: long-poll getUpdates and reply via sendMessage on the Bot API.

use crate::channels::inbound::InboundMessage;
use crate::channels::session::{ChatSession, SessionEvent};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;

pub const TELEGRAM_CHANNEL_ID: &str = "telegram";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramUser {
    fn display_name(&self) -> Option<String> {
        let full = match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        };
        let full = full.trim().to_string();
        if full.is_empty() {
            self.username.clone()
        } else {
            Some(full)
        }
    }
}

impl TelegramMessage {
    /// Convert to an inbound message: group title or sender name as display name, chat id as raw id.
    pub fn to_inbound(&self) -> InboundMessage {
        let chat_id = self.chat.id.to_string();
        let display_name = self
            .chat
            .title
            .clone()
            .or_else(|| self.from.as_ref().and_then(TelegramUser::display_name));
        InboundMessage {
            channel_id: TELEGRAM_CHANNEL_ID.to_string(),
            conversation_id: chat_id.clone(),
            message_id: Some(self.message_id.to_string()),
            sender_id: chat_id,
            display_name,
            text: self
                .text
                .clone()
                .or_else(|| self.caption.clone())
                .unwrap_or_default(),
        }
    }
}

/// Telegram session: long-polls for updates and sends replies via sendMessage.
pub struct TelegramSession {
    id: String,
    token: String,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(token, TELEGRAM_API_BASE)
    }

    /// Session against a custom Bot API base URL (local Bot API server, tests).
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            id: TELEGRAM_CHANNEL_ID.to_string(),
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Verify the token with getMe, then start the getUpdates loop. Emits Ready once getMe succeeds.
    pub fn start(self: Arc<Self>, events_tx: mpsc::Sender<SessionEvent>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram session: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            match self.get_me().await {
                Ok(name) => {
                    log::info!("telegram session: authenticated as {}", name);
                    if events_tx.send(SessionEvent::Ready).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    log::warn!("telegram getMe failed: {}", e);
                    let _ = events_tx
                        .send(SessionEvent::Disconnected { reason: e })
                        .await;
                    return;
                }
            }
            run_get_updates_loop(self, events_tx).await;
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, String> {
        let res = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("{} failed: {} {}", method, status, body));
        }
        let data: ApiResponse<T> = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err(format!(
                "{} returned ok: false ({})",
                method,
                data.description.unwrap_or_default()
            ));
        }
        data.result
            .ok_or_else(|| format!("{} returned no result", method))
    }

    /// Call getMe; returns the bot username.
    async fn get_me(&self) -> Result<String, String> {
        let me: TelegramUser = self.call("getMe", &serde_json::json!({})).await?;
        Ok(me.username.unwrap_or(me.first_name))
    }

    /// Call getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), String> {
        let mut body = serde_json::json!({ "timeout": LONG_POLL_TIMEOUT });
        if let Some(off) = offset {
            body["offset"] = serde_json::json!(off);
        }
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", &body).await?;
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Send a text message to a chat, optionally as a reply to one of its messages.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<(), String> {
        let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Some(id) = reply_to.and_then(|id| id.parse::<i64>().ok()) {
            body["reply_to_message_id"] = serde_json::json!(id);
        }
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }
}

async fn run_get_updates_loop(
    session: Arc<TelegramSession>,
    events_tx: mpsc::Sender<SessionEvent>,
) {
    let mut offset: Option<i64> = None;
    while session.running() {
        match session.get_updates(offset).await {
            Ok((updates, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for u in updates {
                    let Some(ref msg) = u.message else { continue };
                    if events_tx
                        .send(SessionEvent::Message(msg.to_inbound()))
                        .await
                        .is_err()
                    {
                        log::debug!("telegram: event channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram session: getUpdates loop stopped");
}

#[async_trait]
impl ChatSession for TelegramSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn reply(&self, message: &InboundMessage, text: &str) -> Result<(), String> {
        self.send_message(
            &message.conversation_id,
            text,
            message.message_id.as_deref(),
        )
        .await
    }
}
