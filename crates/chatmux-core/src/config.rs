//! Relay and client configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables, then command-line flags (applied by the binaries).
//!
//! ```toml
//! # ~/.config/chatmux/relay.toml
//! port = 5055
//! bind = "0.0.0.0"
//! max_clients = 8
//! buffer_size = 100
//! poll_interval_ms = 100
//! outbox_limit = 65536
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default TCP port for both ends.
pub const DEFAULT_PORT: u16 = 5055;

/// Default host the client connects to.
pub const DEFAULT_HOST: &str = "localhost";

/// Default bind address of the relay (wildcard, all interfaces).
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default cap on remote clients: ten poll entries minus listener and operator.
pub const DEFAULT_MAX_CLIENTS: usize = 8;

/// Default size of one message (one read).
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Default relay wake-up interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: i64 = 100;

/// Default per-recipient cap on bytes the OS has not accepted yet.
pub const DEFAULT_OUTBOX_LIMIT: usize = 64 * 1024;

/// Environment variable overriding the port.
pub const ENV_PORT: &str = "CHATMUX_PORT";

/// Environment variable overriding the client's host.
pub const ENV_HOST: &str = "CHATMUX_HOST";

/// Environment variable overriding the relay's remote client cap.
pub const ENV_MAX_CLIENTS: &str = "CHATMUX_MAX_CLIENTS";

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid {field}: {value} ({expected})")]
    Invalid {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

// ============================================================================
// Poll Timeout
// ============================================================================

/// How long one poll wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTimeout {
    /// Block until something is ready.
    Indefinite,
    /// Wake up after at most this long even if nothing is ready.
    After(Duration),
}

impl PollTimeout {
    /// Zero or negative means block indefinitely.
    pub fn from_millis(ms: i64) -> Self {
        if ms <= 0 {
            PollTimeout::Indefinite
        } else {
            PollTimeout::After(Duration::from_millis(ms.unsigned_abs()))
        }
    }

    /// The value a poll call takes (`None` blocks forever).
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            PollTimeout::Indefinite => None,
            PollTimeout::After(d) => Some(d),
        }
    }
}

// ============================================================================
// Relay Configuration
// ============================================================================

/// Settings for the relay (`chatmuxd`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Address to bind the listener on.
    pub bind: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Maximum number of concurrently registered remote clients.
    pub max_clients: usize,

    /// Bytes read per message. One read is one message.
    pub buffer_size: usize,

    /// Poll wake-up interval; zero or negative blocks indefinitely.
    pub poll_interval_ms: i64,

    /// Per-recipient limit on queued, not yet written bytes.
    pub outbox_limit: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            outbox_limit: DEFAULT_OUTBOX_LIMIT,
        }
    }
}

impl RelayConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source, path)
    }

    /// Loads the explicit file if given, otherwise the default file if it
    /// exists, otherwise the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Applies environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_PORT) {
            self.port = parse_port(&value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CLIENTS) {
            self.max_clients = value.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "max_clients",
                value,
                expected: "a non-negative integer",
            })?;
        }
        Ok(())
    }

    /// Checks values that would make the relay unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "buffer_size",
                value: self.buffer_size.to_string(),
                expected: "at least 1 byte",
            });
        }
        if self.outbox_limit < self.buffer_size {
            return Err(ConfigError::Invalid {
                field: "outbox_limit",
                value: self.outbox_limit.to_string(),
                expected: "at least buffer_size",
            });
        }
        if self.bind.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "bind",
                value: self.bind.clone(),
                expected: "a host name or address",
            });
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> PollTimeout {
        PollTimeout::from_millis(self.poll_interval_ms)
    }
}

// ============================================================================
// Client Configuration
// ============================================================================

/// Settings for the peer client (`chatmux`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Bytes read from either side per pump step.
    pub buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ClientConfig {
    /// Applies environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            if !host.trim().is_empty() {
                self.host = host;
            }
        }
        if let Some(value) = lookup(ENV_PORT) {
            self.port = parse_port(&value)?;
        }
        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/chatmux/relay.toml` (or the platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chatmux").join("relay.toml"))
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        field: "port",
        value: value.to_string(),
        expected: "an integer between 0 and 65535",
    })
}
