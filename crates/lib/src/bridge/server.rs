//! Bridge HTTP server and process lifecycle.

use crate::channels::sidecar::{Sidecar, SidecarEnv};
use crate::channels::whatsapp::SECRET_HEADER;
use crate::channels::{
    ChatSession, EventDispatcher, SessionEvent, SidecarEvent, TelegramSession, WhatsAppSession,
};
use crate::config::{self, Config, SessionBackend};
use crate::login;
use crate::relay::{HttpResponder, MessageRelay};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const SESSION_STOP_GRACE: Duration = Duration::from_secs(5);

/// Shared state for the bridge HTTP handlers.
#[derive(Clone)]
struct BridgeState {
    session_id: String,
    port: u16,
    /// Set once the session reported Ready.
    ready: Arc<AtomicBool>,
    /// Sender for sidecar events; the dispatcher receives.
    events_tx: mpsc::Sender<SessionEvent>,
    /// When Some, sidecar event POSTs must carry this in X-Ponte-Secret.
    webhook_secret: Option<String>,
}

/// Host the sidecar should use to reach the bridge (wildcard binds map to loopback).
fn connect_host(bind: &str) -> &str {
    match bind.trim() {
        "0.0.0.0" | "" => "127.0.0.1",
        "::" => "::1",
        b => b,
    }
}

/// Run the bridge until SIGINT or SIGTERM.
pub async fn run_bridge(config: Config, config_path: PathBuf) -> Result<()> {
    run_bridge_until(config, config_path, shutdown_signal()).await
}

/// Run the bridge; binds to config.bridge.bind:config.bridge.port and stops when `shutdown` completes.
/// When bind is not loopback and the WhatsApp backend is used, a webhook secret must be configured.
pub async fn run_bridge_until<F>(config: Config, config_path: PathBuf, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind = config.bridge.bind.trim().to_string();
    let webhook_secret = config::resolve_webhook_secret(&config);
    let backend = config.session.backend;
    if backend == SessionBackend::Whatsapp
        && !config::is_loopback_bind(&bind)
        && webhook_secret.is_none()
    {
        anyhow::bail!(
            "refusing to bind bridge to {} without a sidecar secret (set channels.whatsapp.webhookSecret)",
            bind
        );
    }

    let telegram_token = match backend {
        SessionBackend::Telegram => Some(config::resolve_telegram_token(&config).context(
            "telegram backend selected but no bot token (set channels.telegram.botToken or TELEGRAM_BOT_TOKEN)",
        )?),
        SessionBackend::Whatsapp => None,
    };
    let sidecar_setup = match (&config.channels.whatsapp.command, backend) {
        (Some(command), SessionBackend::Whatsapp) => Some((
            command.clone(),
            config::client_session_dir(&config, &config_path)?,
        )),
        _ => None,
    };

    // Bind before anything is spawned so a taken port leaves nothing running.
    let bind_addr = format!("{}:{}", bind, config.bridge.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    let port = listener
        .local_addr()
        .map(|a| a.port())
        .unwrap_or(config.bridge.port);

    let sidecar = match sidecar_setup {
        Some((command, session_dir)) => {
            let env = SidecarEnv {
                events_url: format!("http://{}:{}/whatsapp/events", connect_host(&bind), port),
                client_id: config.session.client_id.clone(),
                session_dir,
                secret: webhook_secret.clone(),
            };
            Some(Sidecar::spawn(&command, &env)?)
        }
        None => None,
    };

    let responder = HttpResponder::from_config(&config);
    log::info!("relaying messages to {}", responder.url());
    let relay = Arc::new(MessageRelay::new(
        responder,
        config.responder.fallback_message.clone(),
    ));
    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(EVENT_CHANNEL_CAPACITY);

    let mut session_tasks: Vec<JoinHandle<()>> = Vec::new();
    let session: Arc<dyn ChatSession> = match telegram_token {
        None => Arc::new(WhatsAppSession::from_config(&config)),
        Some(token) => {
            let telegram = Arc::new(match config::resolve_telegram_api_base(&config) {
                Some(base) => TelegramSession::with_api_base(token, base),
                None => TelegramSession::new(token),
            });
            session_tasks.push(telegram.clone().start(events_tx.clone()));
            telegram
        }
    };
    let session_id = session.id().to_string();
    log::info!("bridge listening on {}:{} ({} session)", bind, port, session_id);

    let ready_id = session_id.clone();
    let dispatcher = EventDispatcher::new(session.clone())
        .on_login_required(login::print_login_code)
        .on_ready(move || println!("✅ {} bot connected", ready_id))
        .on_message(relay);
    let ready = dispatcher.ready_flag();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut dispatcher_task = tokio::spawn(dispatcher.run_until(events_rx, async move {
        let _ = stop_rx.await;
    }));

    let state = BridgeState {
        session_id,
        port,
        ready,
        events_tx: events_tx.clone(),
        webhook_secret,
    };
    drop(events_tx);

    let mut app = Router::new().route("/", get(health_http));
    if backend == SessionBackend::Whatsapp {
        app = app.route("/whatsapp/events", post(whatsapp_events));
    }
    let app = app.with_state(state);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("bridge server exited");

    // Stop taking events and let in-flight replies go out while the session can still send.
    let _ = stop_tx.send(());
    if tokio::time::timeout(SESSION_STOP_GRACE, &mut dispatcher_task)
        .await
        .is_err()
    {
        log::warn!("in-flight messages did not finish in time, dropping them");
        dispatcher_task.abort();
    }

    log::info!("shutting down {} session", session.id());
    session.stop();
    if let Some(s) = sidecar {
        s.shutdown().await;
    }
    for mut h in session_tasks {
        if tokio::time::timeout(SESSION_STOP_GRACE, &mut h).await.is_err() {
            log::debug!("session task did not stop in time, aborting");
            h.abort();
        }
    }
    log::info!("bridge stopped");
    served
}

/// Future that completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// POST /whatsapp/events: receives sidecar event JSON; verifies optional secret, forwards to the dispatcher.
async fn whatsapp_events(
    State(state): State<BridgeState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.webhook_secret {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let event: SidecarEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            log::debug!("rejecting sidecar event: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    if state
        .events_tx
        .send(event.into_session_event())
        .await
        .is_err()
    {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for liveness checks).
async fn health_http(State(state): State<BridgeState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "session": state.session_id,
        "ready": state.ready.load(Ordering::SeqCst),
        "port": state.port,
    }))
}
