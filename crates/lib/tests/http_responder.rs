//! Integration test: HttpResponder and MessageRelay against an in-process axum stub responder.

use async_trait::async_trait;
use axum::{http::StatusCode, routing::post, Json, Router};
use ponte::channels::{ChatSession, InboundMessage};
use ponte::relay::{HttpResponder, MessageRelay, RelayError, RelayOutcome, RelayRequest, Responder};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Serve `router` on a free local port; returns its base URL.
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

fn request(usuario: &str, mensagem: &str) -> RelayRequest {
    RelayRequest {
        usuario: usuario.to_string(),
        mensagem: mensagem.to_string(),
    }
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

#[tokio::test]
async fn posts_payload_and_returns_resposta() {
    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_stub = seen.clone();
    let base = spawn_stub(Router::new().route(
        "/mensagem",
        post(move |Json(body): Json<Value>| {
            let seen = seen_stub.clone();
            async move {
                let usuario = body["usuario"].as_str().unwrap_or("").to_string();
                seen.lock().unwrap().push(body);
                Json(json!({ "resposta": format!("hi {}", usuario) }))
            }
        }),
    ))
    .await;

    let responder = HttpResponder::new(format!("{}/mensagem", base));
    let reply = responder.respond(&request("Alice", "hello")).await.unwrap();

    assert_eq!(reply, "hi Alice");
    assert_eq!(
        *seen.lock().unwrap(),
        vec![json!({ "usuario": "Alice", "mensagem": "hello" })]
    );
}

#[tokio::test]
async fn empty_message_is_sent_as_empty_string() {
    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_stub = seen.clone();
    let base = spawn_stub(Router::new().route(
        "/mensagem",
        post(move |Json(body): Json<Value>| {
            let seen = seen_stub.clone();
            async move {
                seen.lock().unwrap().push(body);
                Json(json!({ "resposta": "" }))
            }
        }),
    ))
    .await;

    let responder = HttpResponder::new(format!("{}/mensagem", base));
    assert_eq!(responder.respond(&request("Bob", "")).await.unwrap(), "");
    assert_eq!(seen.lock().unwrap()[0]["mensagem"], json!(""));
}

#[tokio::test]
async fn error_status_is_reported_as_status() {
    let base = spawn_stub(Router::new().route(
        "/mensagem",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    ))
    .await;

    let err = HttpResponder::new(format!("{}/mensagem", base))
        .respond(&request("Alice", "hello"))
        .await
        .unwrap_err();

    match err {
        RelayError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn non_json_body_is_a_decode_error() {
    let base = spawn_stub(Router::new().route(
        "/mensagem",
        post(|| async { "<html>internal error</html>" }),
    ))
    .await;

    let err = HttpResponder::new(format!("{}/mensagem", base))
        .respond(&request("Alice", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Decode(_)), "got {:?}", err);
}

#[tokio::test]
async fn missing_resposta_is_a_decode_error() {
    let base = spawn_stub(Router::new().route(
        "/mensagem",
        post(|| async { Json(json!({ "answer": "hi" })) }),
    ))
    .await;

    let err = HttpResponder::new(format!("{}/mensagem", base))
        .respond(&request("Alice", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Decode(_)), "got {:?}", err);
}

#[tokio::test]
async fn unreachable_responder_is_a_request_error() {
    let url = format!("http://127.0.0.1:{}/mensagem", free_port());
    let err = HttpResponder::new(url)
        .respond(&request("Bob", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Request(_)), "got {:?}", err);
}

#[tokio::test]
async fn timeout_is_a_request_error() {
    let base = spawn_stub(Router::new().route(
        "/mensagem",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "resposta": "late" }))
        }),
    ))
    .await;

    let err = HttpResponder::new(format!("{}/mensagem", base))
        .with_timeout(Duration::from_millis(100))
        .respond(&request("Alice", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Request(_)), "got {:?}", err);
}

#[tokio::test]
async fn malformed_reply_relays_fallback_text() {
    let base = spawn_stub(Router::new().route("/mensagem", post(|| async { "not json" })))
        .await;
    let relay = MessageRelay::new(
        HttpResponder::new(format!("{}/mensagem", base)),
        "⚠️ Erro ao processar sua mensagem, tente novamente.",
    );
    let session = RecordingSession::default();
    let msg = InboundMessage {
        channel_id: "recording".to_string(),
        conversation_id: "c1".to_string(),
        sender_id: "c1".to_string(),
        display_name: Some("Alice".to_string()),
        text: "hello".to_string(),
        ..Default::default()
    };

    let outcome = relay.relay(&session, &msg).await.unwrap();

    assert_eq!(outcome, RelayOutcome::Fallback);
    assert_eq!(
        *session.sent.lock().unwrap(),
        vec!["⚠️ Erro ao processar sua mensagem, tente novamente.".to_string()]
    );
}
