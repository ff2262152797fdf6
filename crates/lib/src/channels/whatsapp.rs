//! WhatsApp session through an external automation sidecar.
//!
//! The sidecar owns the WhatsApp Web session (login, credential storage, reconnection).
//! It POSTs events to the bridge (`/whatsapp/events`) and accepts replies on its send endpoint.

use crate::channels::inbound::InboundMessage;
use crate::channels::session::{ChatSession, SessionEvent};
use crate::config::Config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

pub const WHATSAPP_CHANNEL_ID: &str = "whatsapp";

/// Header carrying the shared secret on sidecar event POSTs.
pub const SECRET_HEADER: &str = "X-Ponte-Secret";

/// Event payload POSTed by the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SidecarEvent {
    Qr {
        code: String,
    },
    Ready,
    #[serde(rename_all = "camelCase")]
    Message {
        #[serde(default)]
        id: Option<String>,
        from: String,
        #[serde(default)]
        chat_name: Option<String>,
        #[serde(default)]
        body: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

impl SidecarEvent {
    pub fn into_session_event(self) -> SessionEvent {
        match self {
            SidecarEvent::Qr { code } => SessionEvent::LoginRequired { code },
            SidecarEvent::Ready => SessionEvent::Ready,
            SidecarEvent::Message {
                id,
                from,
                chat_name,
                body,
            } => SessionEvent::Message(InboundMessage {
                channel_id: WHATSAPP_CHANNEL_ID.to_string(),
                conversation_id: from.clone(),
                message_id: id,
                sender_id: from,
                display_name: chat_name,
                text: body,
            }),
            SidecarEvent::Disconnected { reason } => SessionEvent::Disconnected { reason },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    client_id: &'a str,
    to: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quoted_message_id: Option<&'a str>,
}

/// WhatsApp session handle: replies go to the sidecar's send endpoint.
pub struct WhatsAppSession {
    id: String,
    client_id: String,
    send_url: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl WhatsAppSession {
    pub fn new(client_id: impl Into<String>, send_url: impl Into<String>) -> Self {
        Self {
            id: WHATSAPP_CHANNEL_ID.to_string(),
            client_id: client_id.into(),
            send_url: send_url.into(),
            running: AtomicBool::new(true),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.session.client_id.clone(),
            config.channels.whatsapp.send_url.trim().to_string(),
        )
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Send a text message to a chat via the sidecar, optionally quoting a message.
    pub async fn send_message(
        &self,
        to: &str,
        text: &str,
        quoted_message_id: Option<&str>,
    ) -> Result<(), String> {
        if !self.running() {
            return Err("whatsapp session stopped".to_string());
        }
        let body = SendRequest {
            client_id: &self.client_id,
            to,
            text,
            quoted_message_id,
        };
        let res = self
            .client
            .post(&self.send_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("sidecar send failed: {} {}", status, body));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatSession for WhatsAppSession {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_event_maps_to_inbound() {
        let ev: SidecarEvent = serde_json::from_str(
            r#"{"type":"message","id":"ABC","from":"5511999990000@c.us","chatName":"Alice","body":"hello"}"#,
        )
        .unwrap();
        let SessionEvent::Message(msg) = ev.into_session_event() else {
            panic!("expected message event");
        };
        assert_eq!(msg.channel_id, "whatsapp");
        assert_eq!(msg.conversation_id, "5511999990000@c.us");
        assert_eq!(msg.message_id.as_deref(), Some("ABC"));
        assert_eq!(msg.sender(), "Alice");
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn message_without_body_or_name() {
        let ev: SidecarEvent =
            serde_json::from_str(r#"{"type":"message","from":"5511@c.us"}"#).unwrap();
        let SessionEvent::Message(msg) = ev.into_session_event() else {
            panic!("expected message event");
        };
        assert_eq!(msg.text, "");
        assert_eq!(msg.sender(), "5511@c.us");
        assert!(msg.message_id.is_none());
    }

    #[test]
    fn lifecycle_events_decode() {
        let qr: SidecarEvent = serde_json::from_str(r#"{"type":"qr","code":"2@xyz"}"#).unwrap();
        assert_eq!(
            qr.into_session_event(),
            SessionEvent::LoginRequired {
                code: "2@xyz".to_string()
            }
        );
        let ready: SidecarEvent = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready.into_session_event(), SessionEvent::Ready);
        let gone: SidecarEvent =
            serde_json::from_str(r#"{"type":"disconnected","reason":"LOGOUT"}"#).unwrap();
        assert_eq!(
            gone.into_session_event(),
            SessionEvent::Disconnected {
                reason: "LOGOUT".to_string()
            }
        );
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(serde_json::from_str::<SidecarEvent>(r#"{"type":"typing"}"#).is_err());
    }

    #[test]
    fn send_request_omits_missing_quote() {
        let body = SendRequest {
            client_id: "bot-principal",
            to: "5511@c.us",
            text: "oi",
            quoted_message_id: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "clientId": "bot-principal", "to": "5511@c.us", "text": "oi" })
        );
    }

    #[tokio::test]
    async fn stopped_session_refuses_to_send() {
        let session = WhatsAppSession::new("bot-principal", "http://127.0.0.1:9/send");
        session.stop();
        let err = session.send_message("5511@c.us", "oi", None).await.unwrap_err();
        assert!(err.contains("stopped"));
    }
}
