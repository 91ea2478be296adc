//! Error taxonomy shared by the relay and the client.
//!
//! Errors fall into three classes:
//! - setup failures ([`SetupError`]) are fatal and end the process
//! - transient conditions (would-block, interrupted) are not errors at all,
//!   see [`classify`]
//! - participant failures ([`ParticipantError`]) affect a single endpoint and
//!   are isolated by disconnecting it

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

// ============================================================================
// Setup Errors
// ============================================================================

/// Failures while bringing up the relay. Always fatal.
#[derive(Error, Debug)]
pub enum SetupError {
    /// The bind address did not resolve to anything usable.
    #[error("Failed to resolve {host}:{port}: {reason}")]
    Resolve {
        host: String,
        port: u16,
        reason: String,
    },

    /// Every resolved address refused to bind.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The operator channel could not be created.
    #[error("Failed to create operator channel: {0}")]
    Operator(#[source] io::Error),

    /// The poll instance could not be created or a source could not be registered.
    #[error("Failed to set up poller: {0}")]
    Poll(#[source] io::Error),
}

// ============================================================================
// Participant Errors
// ============================================================================

/// A failure confined to one participant's descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParticipantError {
    /// The peer closed its side, or the OS accepted zero bytes on write.
    #[error("Connection closed")]
    Closed,

    /// Non-transient I/O failure.
    #[error("I/O error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    /// The recipient stopped draining and its pending bytes passed the limit.
    #[error("Outbox overflow: {queued} bytes queued (limit: {limit})")]
    Overflow { queued: usize, limit: usize },
}

impl From<io::Error> for ParticipantError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WriteZero | io::ErrorKind::UnexpectedEof => ParticipantError::Closed,
            kind => ParticipantError::Io {
                kind,
                message: e.to_string(),
            },
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// How an I/O error on a non-blocking descriptor should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoClass {
    /// Would block or interrupted: no work this turn, try again later.
    Transient,
    /// Anything else.
    Fatal,
}

/// Classifies an I/O error.
pub fn classify(error: &io::Error) -> IoClass {
    match error.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => IoClass::Transient,
        _ => IoClass::Fatal,
    }
}

/// Returns `true` if the error only means "not ready yet".
pub fn is_transient(error: &io::Error) -> bool {
    classify(error) == IoClass::Transient
}
