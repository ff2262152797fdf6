//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.ponte/config.json`) and environment.
//! Every field has a default, so a missing file behaves like the stock bridge:
//! WhatsApp sidecar session, responder at `http://127.0.0.1:5000/mensagem`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default reply sent into the conversation when the responder call fails.
pub const DEFAULT_FALLBACK_MESSAGE: &str = "⚠️ Erro ao processar sua mensagem, tente novamente.";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Bridge HTTP server settings (health, sidecar event intake).
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Remote responder endpoint and fallback text.
    #[serde(default)]
    pub responder: ResponderConfig,

    /// Which chat session backend to run and where it keeps its state.
    #[serde(default)]
    pub session: SessionConfig,

    /// Per-backend settings.
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Bridge bind address and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Port for the HTTP server (default 15152).
    #[serde(default = "default_bridge_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_bridge_bind")]
    pub bind: String,
}

fn default_bridge_port() -> u16 {
    15152
}

fn default_bridge_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: default_bridge_port(),
            bind: default_bridge_bind(),
        }
    }
}

/// Remote responder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderConfig {
    /// Endpoint receiving `{ usuario, mensagem }`. Overridden by PONTE_RESPONDER_URL env.
    #[serde(default = "default_responder_url")]
    pub url: String,

    /// Text sent into the conversation when the responder call fails for any reason.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,

    /// Optional per-request timeout. Unset means a hung call only delays its own reply.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_responder_url() -> String {
    "http://127.0.0.1:5000/mensagem".to_string()
}

fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            url: default_responder_url(),
            fallback_message: default_fallback_message(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// WhatsApp Web through an external automation sidecar.
    #[default]
    Whatsapp,

    /// Telegram Bot API (long-poll getUpdates).
    Telegram,
}

impl SessionBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionBackend::Whatsapp => "whatsapp",
            SessionBackend::Telegram => "telegram",
        }
    }
}

/// Session backend selection and storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default)]
    pub backend: SessionBackend,

    /// Session name handed to the chat-automation library so its stored credentials stay separate.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Where the chat-automation library persists credentials (default ~/.ponte/session).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_client_id() -> String {
    "bot-principal".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::default(),
            client_id: default_client_id(),
            data_dir: None,
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub whatsapp: WhatsAppChannelConfig,

    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// WhatsApp sidecar config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppChannelConfig {
    /// Sidecar endpoint that sends a message into a chat.
    #[serde(default = "default_whatsapp_send_url")]
    pub send_url: String,

    /// Shared secret the sidecar sends as X-Ponte-Secret when posting events. Required for non-loopback binds.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Sidecar command line (program followed by arguments). When set, the bridge spawns and supervises it.
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

fn default_whatsapp_send_url() -> String {
    "http://127.0.0.1:3000/send".to_string()
}

impl Default for WhatsAppChannelConfig {
    fn default() -> Self {
        Self {
            send_url: default_whatsapp_send_url(),
            webhook_secret: None,
            command: None,
        }
    }
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,

    /// Bot API base URL (default https://api.telegram.org). Point at a local Bot API server if needed.
    #[serde(default)]
    pub api_base: Option<String>,
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the responder URL: env PONTE_RESPONDER_URL overrides config.
pub fn resolve_responder_url(config: &Config) -> String {
    non_empty_env("PONTE_RESPONDER_URL").unwrap_or_else(|| config.responder.url.trim().to_string())
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    non_empty_env("TELEGRAM_BOT_TOKEN").or_else(|| {
        config
            .channels
            .telegram
            .bot_token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Custom Bot API base URL, ignoring blank values. None means the public Bot API.
pub fn resolve_telegram_api_base(config: &Config) -> Option<String> {
    config
        .channels
        .telegram
        .api_base
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the sidecar webhook secret, ignoring blank values.
pub fn resolve_webhook_secret(config: &Config) -> Option<String> {
    config
        .channels
        .whatsapp
        .webhook_secret
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PONTE_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".ponte").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Resolve the session data directory: `session.dataDir` (relative paths resolved against
/// the config file's parent) or the `session` subdirectory next to the config file.
pub fn resolve_session_dir(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.session.data_dir {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                config_parent.join(d)
            }
        }
        _ => config_parent.join("session"),
    }
}

/// Client ids name a directory under the session dir, so they must be a single plain path segment.
pub fn validate_client_id(client_id: &str) -> Result<()> {
    if client_id.trim().is_empty() {
        anyhow::bail!("session.clientId must not be empty");
    }
    if client_id.contains(['/', '\\']) || client_id.contains("..") {
        anyhow::bail!(
            "session.clientId {:?} must not contain path separators or \"..\"",
            client_id
        );
    }
    Ok(())
}

/// Directory holding credentials for this client id, e.g. `~/.ponte/session/session-bot-principal`.
pub fn client_session_dir(config: &Config, config_path: &Path) -> Result<PathBuf> {
    validate_client_id(&config.session.client_id)?;
    Ok(resolve_session_dir(config, config_path)
        .join(format!("session-{}", config.session.client_id)))
}

/// Load config from the given path (or PONTE_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    validate_client_id(&config.session.client_id)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok((config, path))
}
