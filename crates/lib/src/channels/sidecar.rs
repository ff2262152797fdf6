//! Sidecar supervision: spawn the WhatsApp automation process and forward its output to the log.
//! No shell is used; the configured command is passed as a program plus argument list.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Environment handed to the sidecar process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarEnv {
    /// Where the sidecar POSTs events (e.g. http://127.0.0.1:15152/whatsapp/events).
    pub events_url: String,
    /// Session name for the automation library's local auth store.
    pub client_id: String,
    /// Directory holding this client's stored credentials.
    pub session_dir: PathBuf,
    /// Shared secret the sidecar must send back as X-Ponte-Secret, if configured.
    pub secret: Option<String>,
}

impl SidecarEnv {
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("PONTE_EVENTS_URL", self.events_url.clone()),
            ("PONTE_CLIENT_ID", self.client_id.clone()),
            (
                "PONTE_SESSION_DIR",
                self.session_dir.to_string_lossy().into_owned(),
            ),
        ];
        if let Some(ref s) = self.secret {
            vars.push(("PONTE_SECRET", s.clone()));
        }
        vars
    }
}

/// A running sidecar process and its log forwarders.
pub struct Sidecar {
    child: Child,
    forwarders: Vec<JoinHandle<()>>,
}

impl Sidecar {
    /// Spawn `command` (program + args) with the sidecar environment. The session directory is created first.
    pub fn spawn(command: &[String], env: &SidecarEnv) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("sidecar command is empty")?;
        ensure_dir(&env.session_dir)?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env.vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning sidecar {}", program))?;
        log::info!("sidecar started: {} (pid {:?})", program, child.id());

        let mut forwarders = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(stderr)));
        }
        Ok(Self { child, forwarders })
    }

    /// Kill the process and wait for the log forwarders to drain.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            log::debug!("sidecar kill: {}", e);
        }
        for h in self.forwarders.drain(..) {
            let _ = h.await;
        }
        log::info!("sidecar stopped");
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating session directory {}", dir.display()))
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => log::info!("[sidecar] {}", line.trim_end()),
            Ok(None) => break,
            Err(e) => {
                log::debug!("sidecar output closed: {}", e);
                break;
            }
        }
    }
}
