//! chatmux relay - single-threaded poll-driven chat relay
//!
//! This crate provides the relay behind `chatmuxd`:
//! - `event_loop` - the poll loop that owns every descriptor
//! - `registry` - listener, operator channel and clients in fixed slot order
//! - `router` - broadcast fan-out with per-recipient failure isolation
//! - `outbox` - completion of short non-blocking writes
//! - `operator` - the local operator channel and its terminal front end
//! - `transport` - listener bring-up
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      chatmuxd process                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ operator thread │◀═══▶│        EventLoop            │   │
//! │  │ (stdin/stdout)  │     │  (mio::Poll, one thread)    │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │                   │
//! │                          ┌──────────────┴──────────────┐   │
//! │                          ▼                             ▼   │
//! │                 ┌─────────────────┐     ┌─────────────────┐│
//! │                 │    Registry     │     │     router      ││
//! │                 │ (slot invariant)│     │   (fan-out)     ││
//! │                 └─────────────────┘     └─────────────────┘│
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Failures on one participant never take down the others

use std::io;

use chatmux_core::{ConfigError, ParticipantError, SetupError};

pub mod event_loop;
pub mod operator;
pub mod outbox;
pub mod participant;
pub mod registry;
pub mod router;
pub mod transport;

pub use event_loop::{DisconnectReason, EventLoop, RelayEvent, Turn};
pub use operator::OperatorFront;
pub use registry::{Registry, RegistryError};
pub use router::{route, Endpoint, RouteReport};

/// Errors that end the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Poll failed: {0}")]
    Poll(#[source] io::Error),

    #[error("Operator channel failed: {0}")]
    Operator(ParticipantError),
}
