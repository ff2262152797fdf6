//! Integration test: a failed responder call is logged as a warning while the fallback is sent.
//! Kept in its own test binary because it installs the process-wide logger.

use async_trait::async_trait;
use axum::{http::StatusCode, routing::post, Router};
use ponte::channels::{ChatSession, InboundMessage};
use ponte::relay::{HttpResponder, MessageRelay, RelayOutcome};
use std::sync::Mutex;

const FALLBACK: &str = "⚠️ Erro ao processar sua mensagem, tente novamente.";

/// Keeps every record emitted by the crate.
struct CaptureLogger {
    records: Mutex<Vec<(log::Level, String)>>,
}

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if record.target().starts_with("ponte") {
            self.records
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: Mutex::new(Vec::new()),
};

fn warnings_containing(needle: &str) -> Vec<String> {
    LOGGER
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|(level, msg)| *level == log::Level::Warn && msg.contains(needle))
        .map(|(_, msg)| msg.clone())
        .collect()
}

async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

#[derive(Default)]
struct RecordingSession {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatSession for RecordingSession {
    fn id(&self) -> &str {
        "recording"
    }

    fn stop(&self) {}

    async fn reply(&self, _message: &InboundMessage, text: &str) -> Result<(), String> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn message(sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        channel_id: "recording".to_string(),
        conversation_id: sender.to_string(),
        sender_id: sender.to_string(),
        display_name: Some(sender.to_string()),
        text: text.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn failed_responder_calls_are_logged_and_answered_with_fallback() {
    log::set_logger(&LOGGER).expect("install capture logger");
    log::set_max_level(log::LevelFilter::Debug);

    let base = spawn_stub(
        Router::new()
            .route("/malformed", post(|| async { "not json" }))
            .route(
                "/broken",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            ),
    )
    .await;
    let session = RecordingSession::default();

    let relay = MessageRelay::new(HttpResponder::new(format!("{}/malformed", base)), FALLBACK);
    let outcome = relay.relay(&session, &message("Alice", "hello")).await.unwrap();
    assert_eq!(outcome, RelayOutcome::Fallback);

    let relay = MessageRelay::new(HttpResponder::new(format!("{}/broken", base)), FALLBACK);
    let outcome = relay.relay(&session, &message("Bob", "oi")).await.unwrap();
    assert_eq!(outcome, RelayOutcome::Fallback);

    assert_eq!(
        *session.sent.lock().unwrap(),
        vec![FALLBACK.to_string(), FALLBACK.to_string()]
    );

    let alice = warnings_containing("responder call for Alice failed");
    assert_eq!(alice.len(), 1, "warnings: {:?}", alice);
    assert!(alice[0].contains("malformed body"), "{}", alice[0]);

    let bob = warnings_containing("responder call for Bob failed");
    assert_eq!(bob.len(), 1, "warnings: {:?}", bob);
    assert!(bob[0].contains("500"), "{}", bob[0]);

    // A fallback is not a delivered responder reply.
    assert!(LOGGER
        .records
        .lock()
        .unwrap()
        .iter()
        .all(|(_, msg)| !msg.starts_with("reply sent")));
}
