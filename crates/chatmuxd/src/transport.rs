//! Listener bring-up.
//!
//! `mio` sockets are non-blocking from construction, and `mio`'s bind sets
//! `SO_REUSEADDR` on Unix, so nothing here toggles descriptor modes after the
//! fact.

use std::net::{SocketAddr, ToSocketAddrs};

use chatmux_core::SetupError;
use mio::net::TcpListener;
use tracing::{debug, info};

/// Resolves `host:port` and binds the first address that accepts.
pub fn bind_listener(host: &str, port: u16) -> Result<TcpListener, SetupError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| SetupError::Resolve {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })?
        .collect();

    let mut last_error = None;
    for addr in addrs {
        match TcpListener::bind(addr) {
            Ok(listener) => {
                let local = listener.local_addr().unwrap_or(addr);
                info!(addr = %local, "Relay listening");
                return Ok(listener);
            }
            Err(e) => {
                debug!(addr = %addr, error = %e, "Bind attempt failed");
                last_error = Some(SetupError::Bind { addr, source: e });
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SetupError::Resolve {
        host: host.to_string(),
        port,
        reason: "no addresses found".to_string(),
    }))
}
