//! chatmux core - shared types for the relay and the peer client
//!
//! This crate provides the pieces both executables agree on:
//! - participant identities and display addresses
//! - layered configuration (defaults, TOML file, environment)
//! - the error taxonomy (setup, transient, participant-level)
//! - the two-way stream pump behind every terminal-facing loop
//!
//! Messages are raw bytes with no framing. One read is one message, so a
//! message may be split or coalesced at arbitrary byte boundaries when it
//! exceeds the buffer or arrives in fragments.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()` or `todo!()` outside of tests.

pub mod config;
pub mod error;
pub mod participant;
pub mod pump;

// Re-exports for convenience
pub use config::{ClientConfig, ConfigError, PollTimeout, RelayConfig};
pub use error::{classify, is_transient, IoClass, ParticipantError, SetupError};
pub use participant::{Origin, ParticipantId, PeerAddr};
pub use pump::{pump, PumpEnd, PumpIo};
