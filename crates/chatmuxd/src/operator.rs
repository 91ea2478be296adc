//! Operator channel.
//!
//! The operator is a local human attached to the relay's terminal. The relay
//! and the operator front end are joined by a connected Unix stream pair:
//!
//! ```text
//!  stdin ──▶ ┌──────────────┐  operator channel  ┌─────────────┐ ──▶ clients
//!            │ front end    │ ◀════════════════▶ │ event loop  │
//! stdout ◀── │ (own thread) │                    │ (slot 1)    │ ◀── clients
//!            └──────────────┘                    └─────────────┘
//! ```
//!
//! The relay end is non-blocking from the moment it is created; the front end
//! runs its own current-thread tokio runtime and uses the shared stream pump.
//! Closing the front end's write half (operator stdin EOF, Ctrl-C, SIGTERM)
//! is how the relay learns to shut down.

use std::io;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::thread;

use chatmux_core::{pump, PumpEnd, PumpIo, SetupError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Creates the operator channel.
///
/// Returns the relay's end, already non-blocking and ready for registration,
/// and the front end's half.
pub fn channel() -> Result<(mio::net::UnixStream, OperatorFront), SetupError> {
    let (relay, front) = StdUnixStream::pair().map_err(SetupError::Operator)?;
    relay.set_nonblocking(true).map_err(SetupError::Operator)?;
    Ok((mio::net::UnixStream::from_std(relay), OperatorFront { stream: front }))
}

/// The operator's end of the channel.
#[derive(Debug)]
pub struct OperatorFront {
    stream: StdUnixStream,
}

impl OperatorFront {
    pub fn from_std(stream: StdUnixStream) -> Self {
        Self { stream }
    }

    /// The raw blocking stream, for driving the relay without a terminal.
    pub fn into_std(self) -> StdUnixStream {
        self.stream
    }

    /// Pumps `input` into the relay and relay output into `output` until
    /// either side closes or `cancel` fires. Must run inside a tokio runtime.
    pub async fn run<I, O>(
        self,
        input: I,
        output: O,
        buffer_size: usize,
        cancel: &CancellationToken,
    ) -> io::Result<PumpEnd>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        self.stream.set_nonblocking(true)?;
        let stream = tokio::net::UnixStream::from_std(self.stream)?;
        let (remote_rx, remote_tx) = stream.into_split();

        pump(
            PumpIo {
                local_in: input,
                local_out: output,
                remote_rx,
                remote_tx,
            },
            buffer_size,
            cancel,
        )
        .await
    }

    /// Starts the terminal front end on its own thread: stdin to the relay,
    /// relay output to stdout, SIGINT/SIGTERM close the channel.
    pub fn spawn_terminal(self, buffer_size: usize) -> io::Result<thread::JoinHandle<io::Result<PumpEnd>>> {
        thread::Builder::new()
            .name("operator".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;

                let cancel = CancellationToken::new();
                let result = runtime.block_on(async {
                    let signal_token = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = wait_for_shutdown_signal().await {
                            error!(error = %e, "Error waiting for shutdown signal");
                            return;
                        }
                        signal_token.cancel();
                    });

                    self.run(tokio::io::stdin(), tokio::io::stdout(), buffer_size, &cancel)
                        .await
                });

                match &result {
                    Ok(end) => debug!(end = ?end, "Operator front end stopped"),
                    Err(e) => error!(error = %e, "Operator front end failed"),
                }

                // stdin reads run on a blocking thread that cannot be interrupted
                runtime.shutdown_background();
                result
            })
    }
}

async fn wait_for_shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    Ok(())
}
