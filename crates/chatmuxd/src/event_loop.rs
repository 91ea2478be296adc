//! The relay event loop.
//!
//! One thread, one `mio::Poll`, one wait per turn. On every wake the loop
//! services, in this order:
//!
//! 1. writable edges: retry queued bytes (outbox flush)
//! 2. the listener: accept until would-block, register or refuse each client
//! 3. the operator channel: one bounded read, fanned out to every client
//! 4. clients, ascending slot order: one bounded read each, fanned out to the
//!    operator and every other client
//!
//! The client pass walks a snapshot of ready ids taken before any servicing.
//! Each id is looked up again when its turn comes, so a departure in the
//! middle of the pass neither skips nor double-services anyone.
//!
//! `mio` readiness is edge-triggered while the loop reads at most one buffer
//! per participant per wake. A read that fills the buffer marks the
//! participant as backlogged, and so does readiness that arrives with the
//! read side already closed (data followed by end-of-stream is one edge).
//! Backlogged participants are treated as ready on the next turn and that
//! turn's wait does not block.
//!
//! The listener gets the same treatment after a failed `accept`: pending
//! connections are retried on the next turn, no later than `ACCEPT_RETRY`.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Participant failures disconnect that participant and the loop continues
//! - Only poll failures and operator channel failures end the loop with an error

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use chatmux_core::{
    is_transient, Origin, ParticipantError, ParticipantId, PeerAddr, PollTimeout, RelayConfig,
};
use mio::net::{TcpListener, TcpStream, UnixStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, error, info, warn};

use crate::operator::{self, OperatorFront};
use crate::participant::{Participant, ReadOutcome};
use crate::registry::Registry;
use crate::router::{self, Endpoint, RouteReport};
use crate::transport;
use crate::RelayError;

const LISTENER: Token = Token(0);
const OPERATOR: Token = Token(1);

/// Capacity of the readiness event buffer.
const EVENT_CAPACITY: usize = 128;

/// Longest wait before retrying an `accept` that failed.
const ACCEPT_RETRY: Duration = Duration::from_millis(100);

/// A remote client as the relay holds it.
pub type Client = Participant<TcpStream>;

/// The operator channel as the relay holds it.
pub type Operator = Participant<UnixStream>;

/// The registry the event loop owns.
pub type RelayRegistry = Registry<TcpListener, Operator, Client>;

// ============================================================================
// Turn Reporting
// ============================================================================

/// Why a client left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client closed its side.
    EndOfStream,
    /// Reading from the client failed.
    ReadFailed(ParticipantError),
    /// Writing to the client failed or its outbox overflowed.
    WriteFailed(ParticipantError),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::EndOfStream => write!(f, "end of stream"),
            DisconnectReason::ReadFailed(e) => write!(f, "read failed: {e}"),
            DisconnectReason::WriteFailed(e) => write!(f, "write failed: {e}"),
        }
    }
}

/// Something that happened during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A client was accepted and registered.
    Connected {
        id: ParticipantId,
        peer: PeerAddr,
        slot: usize,
    },
    /// A connection was accepted and closed again because the relay is full.
    Refused { peer: PeerAddr },
    /// A client was removed and its descriptor closed.
    Disconnected {
        id: ParticipantId,
        peer: Option<PeerAddr>,
        reason: DisconnectReason,
    },
    /// A client message was fanned out.
    Relayed {
        from: ParticipantId,
        bytes: usize,
        recipients: usize,
    },
    /// An operator message was fanned out to the clients.
    Announced { bytes: usize, recipients: usize },
}

/// Result of one [`EventLoop::poll_once`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Turn {
    pub events: Vec<RelayEvent>,
    /// The operator channel reached end-of-stream; the relay should stop.
    pub shutdown: bool,
}

enum Flow {
    Continue,
    Stop,
}

// ============================================================================
// Event Loop
// ============================================================================

/// Single-threaded relay over a listener, the operator channel and the clients.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    registry: RelayRegistry,
    next_id: ParticipantId,
    buffer: Vec<u8>,
    timeout: PollTimeout,
    outbox_limit: usize,
    local_addr: SocketAddr,
    /// The last `accept` failed with connections possibly still queued.
    accept_retry: bool,
}

impl EventLoop {
    /// Binds the listener and creates the operator channel.
    ///
    /// Every failure here is a setup failure and fatal.
    pub fn bind(config: &RelayConfig) -> Result<(Self, OperatorFront), RelayError> {
        config.validate()?;
        let listener = transport::bind_listener(&config.bind, config.port)?;
        let (relay_end, front) = operator::channel()?;
        let event_loop = Self::new(config, listener, relay_end)?;
        Ok((event_loop, front))
    }

    /// Builds the loop around an already bound listener and operator channel end.
    pub fn new(
        config: &RelayConfig,
        mut listener: TcpListener,
        mut operator: UnixStream,
    ) -> Result<Self, RelayError> {
        let setup = chatmux_core::SetupError::Poll;

        let poll = Poll::new().map_err(setup)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(setup)?;
        poll.registry()
            .register(&mut operator, OPERATOR, Interest::READABLE | Interest::WRITABLE)
            .map_err(setup)?;

        let local_addr = listener.local_addr().map_err(setup)?;
        let operator = Participant::operator(operator, config.outbox_limit);

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            registry: Registry::new(listener, operator, config.max_clients),
            next_id: ParticipantId::FIRST_CLIENT,
            buffer: vec![0u8; config.buffer_size.max(1)],
            timeout: config.poll_timeout(),
            outbox_limit: config.outbox_limit,
            local_addr,
            accept_retry: false,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &RelayRegistry {
        &self.registry
    }

    pub fn client_count(&self) -> usize {
        self.registry.client_count()
    }

    /// Runs turns until the operator channel closes.
    pub fn run(mut self) -> Result<(), RelayError> {
        info!(
            addr = %self.local_addr,
            max_clients = self.registry.max_clients(),
            "Relay event loop started"
        );

        loop {
            let turn = self.poll_once()?;
            if turn.shutdown {
                break;
            }
        }

        info!(clients = self.registry.client_count(), "Relay event loop stopped");
        Ok(())
    }

    /// Waits once and services everything that is ready.
    pub fn poll_once(&mut self) -> Result<Turn, RelayError> {
        let mut turn = Turn::default();

        let timeout = self.wait_timeout();
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(turn),
            Err(e) => return Err(RelayError::Poll(e)),
        }

        let mut listener_ready = self.accept_retry;
        let mut operator_readable = false;
        let mut operator_writable = false;
        let mut readable: HashSet<ParticipantId> = HashSet::new();
        let mut writable: Vec<ParticipantId> = Vec::new();
        let mut hangups: Vec<ParticipantId> = Vec::new();

        for event in self.events.iter() {
            let closed = event.is_read_closed() || event.is_error();
            let wants_read = event.is_readable() || closed;
            match event.token() {
                LISTENER => listener_ready = true,
                OPERATOR => {
                    operator_readable |= wants_read;
                    operator_writable |= event.is_writable();
                    if closed {
                        hangups.push(ParticipantId::OPERATOR);
                    }
                }
                token => {
                    let id = id_for(token);
                    if wants_read {
                        readable.insert(id);
                    }
                    if closed {
                        hangups.push(id);
                    }
                    if event.is_writable() {
                        writable.push(id);
                    }
                }
            }
        }

        for id in hangups {
            if id == ParticipantId::OPERATOR {
                self.registry.operator_mut().mark_hangup();
            } else if let Some(client) = self.registry.get_mut(id) {
                client.mark_hangup();
            }
        }
        operator_readable |= self.registry.operator().has_backlog();
        readable.extend(
            self.registry
                .clients()
                .filter(|c| c.has_backlog())
                .map(Endpoint::id),
        );

        if operator_writable {
            if let Err(e) = self.registry.operator_mut().flush_outbox() {
                return Err(RelayError::Operator(e));
            }
        }
        for id in writable {
            let flushed = match self.registry.get_mut(id) {
                Some(client) => client.flush_outbox(),
                None => continue,
            };
            if let Err(e) = flushed {
                self.disconnect(id, DisconnectReason::WriteFailed(e), &mut turn);
            }
        }

        if listener_ready {
            self.accept_pending(&mut turn);
        }

        if operator_readable {
            if let Flow::Stop = self.service_operator(&mut turn)? {
                turn.shutdown = true;
                return Ok(turn);
            }
        }

        // Snapshot in slot order; departures during the pass are looked up again.
        let ready: Vec<ParticipantId> = self
            .registry
            .client_ids()
            .into_iter()
            .filter(|id| readable.contains(id))
            .collect();

        for id in ready {
            if !self.registry.contains(id) {
                continue;
            }
            self.service_client(id, &mut turn)?;
        }

        Ok(turn)
    }

    fn has_backlog(&self) -> bool {
        self.registry.operator().has_backlog() || self.registry.clients().any(|c| c.has_backlog())
    }

    /// How long this turn may wait for readiness.
    fn wait_timeout(&self) -> Option<Duration> {
        if self.has_backlog() {
            return Some(Duration::ZERO);
        }
        let configured = self.timeout.as_duration();
        if self.accept_retry {
            // Failures like EMFILE persist; retry without spinning.
            return Some(configured.map_or(ACCEPT_RETRY, |d| d.min(ACCEPT_RETRY)));
        }
        configured
    }

    /// Accepts every pending connection.
    fn accept_pending(&mut self, turn: &mut Turn) {
        self.accept_retry = false;
        loop {
            let (mut stream, addr) = match self.registry.listener().accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_transient(&e) => break,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection, retrying next turn");
                    self.accept_retry = true;
                    break;
                }
            };
            let peer = PeerAddr::new(addr);

            if self.registry.is_full() {
                warn!(
                    peer = %peer,
                    max_clients = self.registry.max_clients(),
                    "refusing connection from {peer}: relay full"
                );
                drop(stream);
                turn.events.push(RelayEvent::Refused { peer });
                continue;
            }

            let id = self.next_id.bump();
            if let Err(e) = self.poll.registry().register(
                &mut stream,
                token_for(id),
                Interest::READABLE | Interest::WRITABLE,
            ) {
                warn!(peer = %peer, error = %e, "Failed to register client, closing");
                continue;
            }

            let client = Participant::client(id, peer, stream, self.outbox_limit);
            match self.registry.add(client) {
                Ok(slot) => {
                    info!(peer = %peer, client = %id, slot, "new connection from {peer}...");
                    turn.events.push(RelayEvent::Connected { id, peer, slot });
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "refusing connection from {peer}");
                    turn.events.push(RelayEvent::Refused { peer });
                }
            }
        }
    }

    fn service_operator(&mut self, turn: &mut Turn) -> Result<Flow, RelayError> {
        match self.registry.operator_mut().read_chunk(&mut self.buffer) {
            ReadOutcome::Data(n) => {
                // read_chunk never reports more than the buffer holds
                let payload = &self.buffer[..n];
                let report = router::route(&mut self.registry, Origin::Operator, payload);
                debug!(bytes = n, recipients = report.delivered.len(), "Operator message relayed");
                turn.events.push(RelayEvent::Announced {
                    bytes: n,
                    recipients: report.delivered.len(),
                });
                self.apply_report(report, turn)?;
                Ok(Flow::Continue)
            }
            ReadOutcome::Closed => {
                info!("Operator channel closed, shutting down");
                Ok(Flow::Stop)
            }
            ReadOutcome::NotReady => Ok(Flow::Continue),
            ReadOutcome::Failed(e) => Err(RelayError::Operator(e)),
        }
    }

    fn service_client(&mut self, id: ParticipantId, turn: &mut Turn) -> Result<(), RelayError> {
        let outcome = match self.registry.get_mut(id) {
            Some(client) => client.read_chunk(&mut self.buffer),
            None => return Ok(()),
        };

        match outcome {
            ReadOutcome::Data(n) => {
                let payload = &self.buffer[..n];
                let report = router::route(&mut self.registry, Origin::Client(id), payload);
                debug!(
                    client = %id,
                    bytes = n,
                    recipients = report.delivered.len(),
                    "Client message relayed"
                );
                turn.events.push(RelayEvent::Relayed {
                    from: id,
                    bytes: n,
                    recipients: report.delivered.len(),
                });
                self.apply_report(report, turn)?;
            }
            ReadOutcome::Closed => self.disconnect(id, DisconnectReason::EndOfStream, turn),
            ReadOutcome::NotReady => {}
            ReadOutcome::Failed(e) => self.disconnect(id, DisconnectReason::ReadFailed(e), turn),
        }
        Ok(())
    }

    /// Disconnects recipients that failed; an operator failure is fatal.
    fn apply_report(&mut self, report: RouteReport, turn: &mut Turn) -> Result<(), RelayError> {
        for (id, e) in report.failed {
            self.disconnect(id, DisconnectReason::WriteFailed(e), turn);
        }
        match report.operator_failure {
            Some(e) => Err(RelayError::Operator(e)),
            None => Ok(()),
        }
    }

    /// Deregisters, closes and removes a client.
    fn disconnect(&mut self, id: ParticipantId, reason: DisconnectReason, turn: &mut Turn) {
        let Some((slot, mut client)) = self.registry.remove_by_id(id) else {
            return;
        };

        if let Err(e) = self.poll.registry().deregister(client.stream_mut()) {
            debug!(client = %id, error = %e, "Failed to deregister client");
        }

        let peer = client.peer();
        let label = client.label();
        info!(
            peer = %label,
            client = %id,
            slot,
            connected_secs = peer.map(|p| p.connected_secs()).unwrap_or_default(),
            unsent_bytes = client.pending_bytes(),
            reason = %reason,
            "{label} has disconnected..."
        );

        // Dropping the participant closes the descriptor.
        drop(client);
        turn.events.push(RelayEvent::Disconnected { id, peer, reason });
    }
}

fn token_for(id: ParticipantId) -> Token {
    Token(usize::try_from(id.as_u64()).unwrap_or(usize::MAX))
}

fn id_for(token: Token) -> ParticipantId {
    ParticipantId::new(token.0 as u64)
}
