//! chatmuxd - terminal chat relay
//!
//! Listens for peers over TCP and relays every message to every other peer
//! and to the operator at this terminal. Whatever the operator types is sent
//! to every peer.
//!
//! # Usage
//!
//! ```bash
//! # Relay on the default port
//! chatmuxd
//!
//! # Relay on port 6000 with room for three peers
//! chatmuxd -p 6000 -m 3
//! ```
//!
//! The relay stops when its stdin reaches end-of-stream (Ctrl-D) or on
//! SIGINT/SIGTERM.

use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatmux_core::RelayConfig;
use chatmuxd::EventLoop;

/// chatmux relay - many-to-many terminal chat
#[derive(Parser, Debug)]
#[command(name = "chatmuxd", version, about)]
struct Args {
    /// Port to listen on [default: 5055, env: CHATMUX_PORT]
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(long)]
    bind: Option<String>,

    /// Maximum number of connected peers [default: 8, env: CHATMUX_MAX_CLIENTS]
    #[arg(short = 'm', long)]
    max_clients: Option<usize>,

    /// Bytes read per participant per wake-up [default: 100]
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Poll wake-up interval in milliseconds; 0 or negative waits indefinitely [default: 100]
    #[arg(long, allow_negative_numbers = true)]
    poll_interval_ms: Option<i64>,

    /// Configuration file [default: <config dir>/chatmux/relay.toml if present]
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

impl Args {
    /// Config file, then environment, then flags.
    fn resolve(self) -> Result<RelayConfig> {
        let mut config = RelayConfig::load(self.config.as_deref())?;
        config.apply_env(|key| env::var(key).ok())?;

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(max_clients) = self.max_clients {
            config.max_clients = max_clients;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(poll_interval_ms) = self.poll_interval_ms {
            config.poll_interval_ms = poll_interval_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries chat text only; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chatmuxd=info".parse()?)
                .add_directive("chatmux_core=info".parse()?),
        )
        .init();

    let config = args.resolve().context("Invalid relay configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        port = config.port,
        max_clients = config.max_clients,
        "chatmux relay starting"
    );

    let (event_loop, front) = EventLoop::bind(&config)
        .with_context(|| format!("Failed to start relay on {}:{}", config.bind, config.port))?;

    let operator = front
        .spawn_terminal(config.buffer_size)
        .context("Failed to start operator front end")?;

    if let Err(e) = event_loop.run() {
        error!(error = %e, "Relay error");
        return Err(e.into());
    }

    // The operator thread has already closed its write half; its pending
    // stdin read is abandoned with the process.
    if operator.is_finished() {
        if let Ok(Err(e)) = operator.join() {
            error!(error = %e, "Operator front end failed");
        }
    }

    info!("chatmux relay stopped");
    Ok(())
}
