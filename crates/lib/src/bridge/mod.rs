//! Bridge: wires the chat session, event dispatcher and message relay together.
//!
//! A single port serves the health check and, for the WhatsApp backend, the sidecar
//! event intake (`POST /whatsapp/events`).

mod server;

pub use server::{run_bridge, run_bridge_until};
