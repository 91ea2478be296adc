//! Two-way byte pump between a local pair of streams and a remote stream.
//!
//! Used by the peer client (terminal ↔ relay socket) and by the relay's
//! operator front end (terminal ↔ operator channel). Bytes are forwarded
//! unchanged; there is no framing. The pump blocks on both sources with no
//! timeout and stops at the first end-of-stream on either side, or when the
//! cancellation token fires.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The local input reached end-of-stream. The remote write half was shut down.
    LocalClosed,
    /// The remote side reached end-of-stream.
    RemoteClosed,
    /// The cancellation token fired. The remote write half was shut down.
    Cancelled,
}

/// Local input/output and remote read/write halves of one pump.
pub struct PumpIo<LI, LO, RR, RW> {
    pub local_in: LI,
    pub local_out: LO,
    pub remote_rx: RR,
    pub remote_tx: RW,
}

/// Forwards local input to the remote side and remote input to the local
/// output until either side closes.
pub async fn pump<LI, LO, RR, RW>(
    io: PumpIo<LI, LO, RR, RW>,
    buffer_size: usize,
    cancel: &CancellationToken,
) -> io::Result<PumpEnd>
where
    LI: AsyncRead + Unpin,
    LO: AsyncWrite + Unpin,
    RR: AsyncRead + Unpin,
    RW: AsyncWrite + Unpin,
{
    let PumpIo {
        mut local_in,
        mut local_out,
        mut remote_rx,
        mut remote_tx,
    } = io;

    let size = buffer_size.max(1);
    let mut local_buf = vec![0u8; size];
    let mut remote_buf = vec![0u8; size];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Pump cancelled");
                let _ = remote_tx.shutdown().await;
                return Ok(PumpEnd::Cancelled);
            }

            result = local_in.read(&mut local_buf) => {
                let n = result?;
                if n == 0 {
                    debug!("Local input reached end-of-stream");
                    let _ = remote_tx.shutdown().await;
                    return Ok(PumpEnd::LocalClosed);
                }
                remote_tx.write_all(&local_buf[..n]).await?;
                remote_tx.flush().await?;
            }

            result = remote_rx.read(&mut remote_buf) => {
                let n = result?;
                if n == 0 {
                    debug!("Remote side reached end-of-stream");
                    local_out.flush().await?;
                    return Ok(PumpEnd::RemoteClosed);
                }
                local_out.write_all(&remote_buf[..n]).await?;
                local_out.flush().await?;
            }
        }
    }
}
