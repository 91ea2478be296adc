//! chatmux - terminal chat peer
//!
//! Connects this terminal to a chatmux relay. Lines typed here go to every
//! other participant; everything they send is printed here.
//!
//! # Usage
//!
//! ```bash
//! chatmux                     # localhost:5055
//! chatmux -h chat.lan -p 6000
//! ```
//!
//! Ctrl-D or Ctrl-C hangs up.

use std::env;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use chatmux_client::{ChatClient, ClientError};
use chatmux_core::ClientConfig;

/// chatmux peer - join a terminal chat relay
#[derive(Parser, Debug)]
#[command(name = "chatmux", version, about, disable_help_flag = true)]
struct Args {
    /// Relay host [default: localhost, env: CHATMUX_HOST]
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Relay port [default: 5055, env: CHATMUX_PORT]
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Args {
    fn resolve(self) -> Result<ClientConfig> {
        let mut config = ClientConfig::default();
        config.apply_env(|key| env::var(key).ok())?;
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Quiet by default so the terminal shows chat text; RUST_LOG opts in.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chatmux_client=warn".parse()?)
                .add_directive("chatmux_core=warn".parse()?),
        )
        .init();

    let config = args.resolve().context("Invalid client configuration")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ClientError::Runtime)?;

    let result = runtime.block_on(run(config));

    // A pending stdin read cannot be interrupted; don't wait for it.
    runtime.shutdown_background();
    result
}

async fn run(config: ClientConfig) -> Result<()> {
    let client = ChatClient::connect(&config).await?;
    eprintln!("connected to server: {} ...", client.peer_addr());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("Received Ctrl+C");
                interrupt.cancel();
            }
            Err(e) => error!(error = %e, "Error waiting for Ctrl+C"),
        }
    });

    let end = client
        .run(tokio::io::stdin(), tokio::io::stdout(), &cancel)
        .await?;
    debug!(end = ?end, "Session ended");

    eprintln!("hanging up");
    Ok(())
}
