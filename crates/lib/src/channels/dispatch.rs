//! Event dispatch: typed handlers registered for session events.
//!
//! Each message event runs in its own task, so a slow responder call only delays
//! the reply to that message.

use crate::channels::inbound::InboundMessage;
use crate::channels::session::{ChatSession, SessionEvent};
use crate::relay::RelayError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handles a "message received" event.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        session: Arc<dyn ChatSession>,
        message: InboundMessage,
    ) -> Result<(), RelayError>;
}

type LoginHandler = Box<dyn Fn(&str) + Send + Sync>;
type ReadyHandler = Box<dyn Fn() + Send + Sync>;

/// Routes session events to registered handlers.
pub struct EventDispatcher {
    session: Arc<dyn ChatSession>,
    login_handlers: Vec<LoginHandler>,
    ready_handlers: Vec<ReadyHandler>,
    message_handlers: Vec<Arc<dyn MessageHandler>>,
    ready: Arc<AtomicBool>,
}

impl EventDispatcher {
    pub fn new(session: Arc<dyn ChatSession>) -> Self {
        Self {
            session,
            login_handlers: Vec::new(),
            ready_handlers: Vec::new(),
            message_handlers: Vec::new(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn on_login_required(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.login_handlers.push(Box::new(handler));
        self
    }

    /// Ready handlers fire on the first Ready event only.
    pub fn on_ready(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.ready_handlers.push(Box::new(handler));
        self
    }

    pub fn on_message(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.message_handlers.push(handler);
        self
    }

    /// Shared flag set once the session reported Ready (for health reporting).
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        self.ready.clone()
    }

    /// Dispatch one event. Message handlers are spawned; their handles are returned so callers may await them.
    pub fn dispatch(&self, event: SessionEvent) -> Vec<JoinHandle<()>> {
        match event {
            SessionEvent::LoginRequired { code } => {
                log::info!("{}: login required", self.session.id());
                for h in &self.login_handlers {
                    h(&code);
                }
                Vec::new()
            }
            SessionEvent::Ready => {
                if self.ready.swap(true, Ordering::SeqCst) {
                    log::debug!("{}: ready again", self.session.id());
                } else {
                    log::info!("{}: session ready", self.session.id());
                    for h in &self.ready_handlers {
                        h();
                    }
                }
                Vec::new()
            }
            SessionEvent::Disconnected { reason } => {
                log::warn!("{}: disconnected: {}", self.session.id(), reason);
                Vec::new()
            }
            SessionEvent::Message(msg) => self
                .message_handlers
                .iter()
                .map(|h| {
                    let handler = h.clone();
                    let session = self.session.clone();
                    let msg = msg.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.handle(session, msg).await {
                            log::warn!("inbound: {}", e);
                        }
                    })
                })
                .collect(),
        }
    }

    /// Consume events until every sender is dropped, then wait for in-flight message handlers.
    pub async fn run(self, events: mpsc::Receiver<SessionEvent>) {
        self.run_until(events, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but also stops taking events once `stop` completes.
    /// Messages already received are still handled before this returns.
    pub async fn run_until<F>(self, mut events: mpsc::Receiver<SessionEvent>, stop: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    log::debug!("{}: no longer taking events", self.session.id());
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        in_flight.retain(|h| !h.is_finished());
                        in_flight.extend(self.dispatch(event));
                    }
                    None => {
                        log::debug!("{}: event stream closed", self.session.id());
                        break;
                    }
                },
            }
        }
        if !in_flight.is_empty() {
            log::debug!(
                "{}: waiting for {} in-flight message(s)",
                self.session.id(),
                in_flight.len()
            );
        }
        for h in in_flight {
            let _ = h.await;
        }
    }
}
