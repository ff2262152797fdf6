//! Session handle: one authenticated chat connection owned by the bridge.

use crate::channels::inbound::InboundMessage;
use async_trait::async_trait;

/// Lifecycle and message events emitted by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session needs a manual login; `code` is the one-time token to render as a QR code.
    LoginRequired { code: String },
    /// The session is authenticated and receiving messages.
    Ready,
    /// A chat message arrived.
    Message(InboundMessage),
    /// The collaborator dropped the connection; it owns reconnection.
    Disconnected { reason: String },
}

/// Handle to a running chat session (stop, reply).
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Session id (e.g. "whatsapp").
    fn id(&self) -> &str;
    /// Stop the session connector.
    fn stop(&self);
    /// Send `text` into the conversation `message` came from, quoting it when the platform supports that.
    async fn reply(&self, message: &InboundMessage, text: &str) -> Result<(), String>;
}
