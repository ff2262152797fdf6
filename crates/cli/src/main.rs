use clap::{Parser, Subcommand};
use ponte::channels::InboundMessage;
use ponte::relay::{HttpResponder, MessageRelay, RelayOutcome};

#[derive(Parser)]
#[command(name = "ponte")]
#[command(about = "Relay chat messages to a remote responder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config file and the session directory.
    Init {
        /// Config file path (default: PONTE_CONFIG_PATH or ~/.ponte/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bridge: start the chat session and relay every inbound message to the responder.
    Run {
        /// Config file path (default: PONTE_CONFIG_PATH or ~/.ponte/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Bridge HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send one message to the responder as if it came from a chat, and print the reply.
    Ask {
        /// Config file path (default: PONTE_CONFIG_PATH or ~/.ponte/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Sender identity reported to the responder.
        #[arg(long, default_value = "terminal")]
        sender: String,

        /// Message text (may be empty).
        message: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Some(Commands::Run { .. }) => "info",
        _ => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Some(Commands::Version) => {
            println!("ponte {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, port }) => {
            if let Err(e) = run_bridge(config, port).await {
                log::error!("bridge failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask {
            config,
            sender,
            message,
        }) => {
            if let Err(e) = run_ask(config, sender, message).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(ponte::config::default_config_path);
    let dir = ponte::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_bridge(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = ponte::config::load_config(config_path)?;
    if let Some(p) = port {
        config.bridge.port = p;
    }
    log::info!(
        "starting {} bridge on {}:{}",
        config.session.backend.as_str(),
        config.bridge.bind,
        config.bridge.port
    );
    ponte::bridge::run_bridge(config, path).await
}

async fn run_ask(
    config_path: Option<std::path::PathBuf>,
    sender: String,
    message: String,
) -> anyhow::Result<()> {
    let (config, _) = ponte::config::load_config(config_path)?;
    let relay = MessageRelay::new(
        HttpResponder::from_config(&config),
        config.responder.fallback_message.clone(),
    );
    let inbound = InboundMessage {
        channel_id: "terminal".to_string(),
        conversation_id: sender.clone(),
        sender_id: sender,
        text: message,
        ..Default::default()
    };
    let (reply, outcome) = relay.reply_text(&inbound).await;
    println!("{}", reply_line(&reply));
    if outcome == RelayOutcome::Fallback {
        anyhow::bail!("responder call failed; fallback reply shown");
    }
    Ok(())
}

/// Line printed by `ask`: the reply exactly as the responder sent it.
fn reply_line(reply: &str) -> String {
    format!("< {}", reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_line_keeps_reply_verbatim() {
        assert_eq!(reply_line("  hi Alice\n"), "<   hi Alice\n");
        assert_eq!(reply_line(""), "< ");
    }
}
