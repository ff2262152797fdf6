//! Message relay: forward one inbound chat message to the remote responder and send
//! the reply (or the fallback text) back into the conversation.
//!
//! The responder is an injected capability so tests can substitute a fake.

use crate::channels::{ChatSession, InboundMessage, MessageHandler};
use crate::config::{self, Config};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Body POSTed to the responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub usuario: String,
    pub mensagem: String,
}

/// Body expected back from the responder.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayResponse {
    pub resposta: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("responder request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("responder returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("responder returned a malformed body: {0}")]
    Decode(String),
    #[error("sending reply failed: {0}")]
    Send(String),
}

/// Produces reply text for a relay request.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, request: &RelayRequest) -> Result<String, RelayError>;
}

/// Responder backed by an HTTP endpoint (POST JSON, JSON reply).
#[derive(Clone)]
pub struct HttpResponder {
    url: String,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl HttpResponder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: None,
            client: reqwest::Client::new(),
        }
    }

    /// Responder for the configured URL (PONTE_RESPONDER_URL wins) and timeout.
    pub fn from_config(config: &Config) -> Self {
        let mut responder = Self::new(config::resolve_responder_url(config));
        responder.timeout = config.responder.timeout_secs.map(Duration::from_secs);
        responder
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Responder for HttpResponder {
    async fn respond(&self, request: &RelayRequest) -> Result<String, RelayError> {
        let mut req = self.client.post(&self.url).json(request);
        if let Some(t) = self.timeout {
            req = req.timeout(t);
        }
        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let data: RelayResponse =
            serde_json::from_str(&body).map_err(|e| RelayError::Decode(e.to_string()))?;
        Ok(data.resposta)
    }
}

/// What the relay sent back for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The responder's reply was sent verbatim.
    Replied,
    /// The responder call failed and the fallback text was sent.
    Fallback,
}

/// Forwards inbound messages to a responder. Holds no per-message state.
pub struct MessageRelay<R> {
    responder: R,
    fallback_message: String,
}

impl<R: Responder> MessageRelay<R> {
    pub fn new(responder: R, fallback_message: impl Into<String>) -> Self {
        Self {
            responder,
            fallback_message: fallback_message.into(),
        }
    }

    pub fn fallback_message(&self) -> &str {
        &self.fallback_message
    }

    /// Ask the responder for a reply; any failure becomes the fallback text.
    pub async fn reply_text(&self, message: &InboundMessage) -> (String, RelayOutcome) {
        let request = RelayRequest {
            usuario: message.sender().to_string(),
            mensagem: message.text.clone(),
        };
        match self.responder.respond(&request).await {
            Ok(reply) => (reply, RelayOutcome::Replied),
            Err(e) => {
                log::warn!("relay: responder call for {} failed: {}", request.usuario, e);
                (self.fallback_message.clone(), RelayOutcome::Fallback)
            }
        }
    }

    /// Relay one message: one responder call, one reply into the conversation.
    /// Only a failure to send the reply is returned as an error.
    pub async fn relay(
        &self,
        session: &dyn ChatSession,
        message: &InboundMessage,
    ) -> Result<RelayOutcome, RelayError> {
        log::info!(
            "message received from {}: {}",
            message.sender(),
            message.text
        );
        let (text, outcome) = self.reply_text(message).await;
        session
            .reply(message, &text)
            .await
            .map_err(RelayError::Send)?;
        if outcome == RelayOutcome::Replied {
            log::info!("reply sent: {}", text);
        }
        Ok(outcome)
    }
}

#[async_trait]
impl<R: Responder + 'static> MessageHandler for MessageRelay<R> {
    async fn handle(
        &self,
        session: Arc<dyn ChatSession>,
        message: InboundMessage,
    ) -> Result<(), RelayError> {
        self.relay(session.as_ref(), &message).await.map(|_| ())
    }
}
