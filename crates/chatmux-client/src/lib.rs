//! chatmux peer client
//!
//! Connects a terminal to a chatmux relay:
//! - `client` - the relay connection and its byte pump
//! - `error` - client error types

pub mod client;
pub mod error;

pub use client::ChatClient;
pub use error::{ClientError, Result};
