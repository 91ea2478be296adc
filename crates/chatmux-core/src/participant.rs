//! Participant identities.
//!
//! A [`ParticipantId`] is assigned once when a connection is accepted and is
//! never reused for the lifetime of a relay. Ids, not registry slots, are what
//! readiness events refer to, so compaction can never make an event point at
//! the wrong participant.

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};

/// Stable identity of a relay participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(u64);

impl ParticipantId {
    /// Reserved id of the listening endpoint.
    pub const LISTENER: ParticipantId = ParticipantId(0);

    /// Reserved id of the operator channel.
    pub const OPERATOR: ParticipantId = ParticipantId(1);

    /// First id handed out to a remote client.
    pub const FIRST_CLIENT: ParticipantId = ParticipantId(2);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns this id and advances `self` to the next one.
    pub fn bump(&mut self) -> ParticipantId {
        let current = *self;
        self.0 = self.0.saturating_add(1);
        current
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::LISTENER => write!(f, "listener"),
            Self::OPERATOR => write!(f, "operator"),
            Self(raw) => write!(f, "client-{raw}"),
        }
    }
}

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The local operator channel.
    Operator,
    /// A remote client.
    Client(ParticipantId),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Operator => write!(f, "operator"),
            Origin::Client(id) => write!(f, "{id}"),
        }
    }
}

/// Display identity of a remote peer, resolved at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr {
    addr: SocketAddr,
    connected_at: DateTime<Utc>,
}

impl PeerAddr {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connected_at: Utc::now(),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whole seconds since the connection was accepted.
    pub fn connected_secs(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds().max(0)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}
