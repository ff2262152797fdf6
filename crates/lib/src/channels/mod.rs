//! Chat sessions (WhatsApp sidecar, Telegram) and event dispatch.
//!
//! A session emits [`SessionEvent`]s into an mpsc channel; the [`EventDispatcher`]
//! routes them to typed handlers and owns the session handle used for replies.

mod dispatch;
mod inbound;
mod session;
pub mod sidecar;
pub mod telegram;
pub mod whatsapp;

pub use dispatch::{EventDispatcher, MessageHandler};
pub use inbound::InboundMessage;
pub use session::{ChatSession, SessionEvent};
pub use telegram::{TelegramSession, TelegramUpdate};
pub use whatsapp::{SidecarEvent, WhatsAppSession};
