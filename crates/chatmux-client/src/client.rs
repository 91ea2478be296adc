//! Relay connection for the peer client.
//!
//! A `ChatClient` is one TCP connection to the relay. Once connected it pumps
//! a local input/output pair through the socket until either side closes:
//!
//! 1. `connect` resolves `host:port` and opens the stream
//! 2. `run` forwards local input to the relay and relay output to the local side
//! 3. local end-of-stream shuts down the write half; relay end-of-stream ends the session
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` in this module.

use std::net::SocketAddr;

use chatmux_core::{pump, ClientConfig, PumpEnd, PumpIo};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ClientError, Result};

// ============================================================================
// Chat Client
// ============================================================================

/// A connected peer.
#[derive(Debug)]
pub struct ChatClient {
    stream: TcpStream,
    peer: SocketAddr,
    buffer_size: usize,
}

impl ChatClient {
    /// Connects to the relay named by `config`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Connect` if the name does not resolve or no
    /// resolved address accepts the connection.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|source| ClientError::Connect {
                host: config.host.clone(),
                port: config.port,
                source,
            })?;

        let peer = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to disable Nagle");
        }
        info!(peer = %peer, "Connected to relay");

        Ok(Self {
            stream,
            peer,
            buffer_size: config.buffer_size,
        })
    }

    /// Address of the relay this client is connected to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Pumps `input` to the relay and relay output to `output` until either
    /// side closes or `cancel` fires.
    pub async fn run<I, O>(self, input: I, output: O, cancel: &CancellationToken) -> Result<PumpEnd>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let (remote_rx, remote_tx) = self.stream.into_split();

        let end = pump(
            PumpIo {
                local_in: input,
                local_out: output,
                remote_rx,
                remote_tx,
            },
            self.buffer_size,
            cancel,
        )
        .await?;

        match end {
            PumpEnd::LocalClosed => info!("Input closed, hanging up"),
            PumpEnd::RemoteClosed => info!(peer = %self.peer, "Relay closed the connection"),
            PumpEnd::Cancelled => info!("Interrupted, hanging up"),
        }
        Ok(end)
    }
}
