//! Relay-side participants: a non-blocking stream plus its outbox.

use std::io::{self, Read, Write};

use chatmux_core::{is_transient, ParticipantError, ParticipantId, PeerAddr};

use crate::outbox::Outbox;
use crate::router::Endpoint;

/// Result of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes are in the front of the buffer.
    Data(usize),
    /// End-of-stream: the peer closed its side.
    Closed,
    /// Nothing to read right now.
    NotReady,
    /// Non-transient read failure.
    Failed(ParticipantError),
}

/// A readable/writable endpoint registered with the relay.
///
/// Remote clients carry the peer address they were accepted from; the
/// operator channel has none.
#[derive(Debug)]
pub struct Participant<S> {
    id: ParticipantId,
    peer: Option<PeerAddr>,
    stream: S,
    outbox: Outbox,
    /// The last read filled the whole buffer, so more may be waiting even
    /// though no new readiness edge will arrive.
    backlog: bool,
    /// The peer's close (or a socket error) was signalled together with
    /// readiness. Reads continue until they report it.
    hangup: bool,
}

impl<S> Participant<S> {
    pub fn client(id: ParticipantId, peer: PeerAddr, stream: S, outbox_limit: usize) -> Self {
        Self {
            id,
            peer: Some(peer),
            stream,
            outbox: Outbox::new(outbox_limit),
            backlog: false,
            hangup: false,
        }
    }

    pub fn operator(stream: S, outbox_limit: usize) -> Self {
        Self {
            id: ParticipantId::OPERATOR,
            peer: None,
            stream,
            outbox: Outbox::new(outbox_limit),
            backlog: false,
            hangup: false,
        }
    }

    pub fn peer(&self) -> Option<PeerAddr> {
        self.peer
    }

    /// Display identity used in log lines.
    pub fn label(&self) -> String {
        match self.peer {
            Some(peer) => peer.to_string(),
            None => self.id.to_string(),
        }
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// True when the next turn must read again without waiting for an edge.
    pub fn has_backlog(&self) -> bool {
        self.backlog || self.hangup
    }

    /// Records that readiness arrived with the read side already closed.
    pub fn mark_hangup(&mut self) {
        self.hangup = true;
    }

    pub fn pending_bytes(&self) -> usize {
        self.outbox.pending()
    }
}

impl<S: Read> Participant<S> {
    /// Performs exactly one read into `buf`.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> ReadOutcome {
        self.backlog = false;
        loop {
            match self.stream.read(buf) {
                Ok(0) => {
                    self.hangup = false;
                    return ReadOutcome::Closed;
                }
                Ok(n) => {
                    self.backlog = n == buf.len();
                    return ReadOutcome::Data(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_transient(&e) => {
                    self.hangup = false;
                    return ReadOutcome::NotReady;
                }
                Err(e) => {
                    self.hangup = false;
                    return ReadOutcome::Failed(e.into());
                }
            }
        }
    }
}

impl<S: Write> Participant<S> {
    /// Retries bytes a previous write could not complete.
    pub fn flush_outbox(&mut self) -> Result<(), ParticipantError> {
        self.outbox.flush(&mut self.stream)
    }
}

impl<S: Write> Endpoint for Participant<S> {
    fn id(&self) -> ParticipantId {
        self.id
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), ParticipantError> {
        self.outbox.send(&mut self.stream, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Blocked;

    impl Read for Blocked {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    #[test]
    fn test_full_buffer_read_sets_backlog() {
        let mut p = Participant::operator(Cursor::new(b"0123456789".to_vec()), 64);
        let mut buf = [0u8; 4];

        assert_eq!(p.read_chunk(&mut buf), ReadOutcome::Data(4));
        assert!(p.has_backlog());
        assert_eq!(p.read_chunk(&mut buf), ReadOutcome::Data(4));
        assert_eq!(p.read_chunk(&mut buf), ReadOutcome::Data(2));
        assert!(!p.has_backlog());
        assert_eq!(p.read_chunk(&mut buf), ReadOutcome::Closed);
    }

    #[test]
    fn test_hangup_keeps_reading_until_end_of_stream() {
        let mut p = Participant::operator(Cursor::new(b"bye".to_vec()), 64);
        let mut buf = [0u8; 16];
        p.mark_hangup();

        assert_eq!(p.read_chunk(&mut buf), ReadOutcome::Data(3));
        assert!(p.has_backlog());
        assert_eq!(p.read_chunk(&mut buf), ReadOutcome::Closed);
        assert!(!p.has_backlog());
    }

    #[test]
    fn test_hangup_cleared_when_nothing_to_read() {
        let mut p = Participant::operator(Blocked, 64);
        let mut buf = [0u8; 4];
        p.mark_hangup();
        assert_eq!(p.read_chunk(&mut buf), ReadOutcome::NotReady);
        assert!(!p.has_backlog());
    }

    #[test]
    fn test_would_block_is_not_ready() {
        let mut p = Participant::operator(Blocked, 64);
        let mut buf = [0u8; 4];
        assert_eq!(p.read_chunk(&mut buf), ReadOutcome::NotReady);
    }

    #[test]
    fn test_label_prefers_peer_address() {
        let peer = PeerAddr::new("10.0.0.2:5000".parse().unwrap());
        let client = Participant::client(ParticipantId::new(4), peer, Vec::<u8>::new(), 64);
        assert_eq!(client.label(), "10.0.0.2:5000");

        let operator = Participant::operator(Vec::<u8>::new(), 64);
        assert_eq!(operator.label(), "operator");
    }

    #[test]
    fn test_send_writes_through() {
        let mut client = Participant::client(
            ParticipantId::new(2),
            PeerAddr::new("127.0.0.1:1".parse().unwrap()),
            Vec::<u8>::new(),
            64,
        );
        client.send(b"hello").unwrap();
        assert_eq!(client.stream_mut().as_slice(), b"hello");
        assert_eq!(client.pending_bytes(), 0);
    }
}
