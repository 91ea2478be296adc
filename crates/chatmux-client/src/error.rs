//! Error types for the peer client.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` in this module.

use std::io;
use thiserror::Error;

// ============================================================================
// Client Error Type
// ============================================================================

/// Peer client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the relay.
    ///
    /// Usually the relay is not running, or host/port point somewhere else.
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The connection or the terminal failed mid-session.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The async runtime could not be started.
    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
