//! Inbound message from a chat session: handed to the dispatcher and relayed to the responder.

/// A message received by a session. Request-scoped; nothing keeps it after the reply is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel_id: String,
    /// Where the reply goes (WhatsApp jid, Telegram chat id).
    pub conversation_id: String,
    /// Platform message id, used to quote the inbound message in the reply.
    pub message_id: Option<String>,
    /// Raw connection identifier of the sender.
    pub sender_id: String,
    /// Chat display name, when the platform provides one.
    pub display_name: Option<String>,
    /// Body text; may be empty (media without caption, stickers).
    pub text: String,
}

impl InboundMessage {
    /// Sender identity: the display name exactly as the platform gave it, else the raw
    /// identifier when the name is missing or empty.
    pub fn sender(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.sender_id)
    }
}
