//! Ponte core library: chat sessions, event dispatch, the message relay and the
//! bridge server used by the CLI.

pub mod bridge;
pub mod channels;
pub mod config;
pub mod init;
pub mod login;
pub mod relay;
