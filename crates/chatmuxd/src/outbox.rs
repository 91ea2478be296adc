//! Short-write completion for non-blocking writers.
//!
//! A non-blocking `write` may accept fewer bytes than offered, or none at all
//! (would-block). The outbox keeps whatever the OS did not take, in stream
//! order, and hands it to the writer again on the next writable readiness.
//! Nothing is ever silently dropped: a recipient that stops draining long
//! enough to exceed the limit fails with [`ParticipantError::Overflow`].

use std::io::{self, Write};

use chatmux_core::{is_transient, ParticipantError};

/// Pending bytes for one writable participant.
#[derive(Debug)]
pub struct Outbox {
    pending: Vec<u8>,
    limit: usize,
}

impl Outbox {
    pub fn new(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
        }
    }

    /// Bytes still waiting for the writer.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Writes `bytes`, looping over partial writes; whatever remains after a
    /// would-block is queued behind any bytes already pending.
    pub fn send<W: Write>(&mut self, writer: &mut W, bytes: &[u8]) -> Result<(), ParticipantError> {
        if !self.pending.is_empty() {
            self.pending.extend_from_slice(bytes);
            self.check_limit()?;
            return self.flush(writer);
        }

        let written = write_until_blocked(writer, bytes)?;
        if let Some(rest) = bytes.get(written..) {
            self.pending.extend_from_slice(rest);
        }
        self.check_limit()
    }

    /// Hands pending bytes to the writer until it would block or the queue drains.
    pub fn flush<W: Write>(&mut self, writer: &mut W) -> Result<(), ParticipantError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let written = write_until_blocked(writer, &self.pending)?;
        self.pending.drain(..written);
        Ok(())
    }

    fn check_limit(&self) -> Result<(), ParticipantError> {
        if self.pending.len() > self.limit {
            return Err(ParticipantError::Overflow {
                queued: self.pending.len(),
                limit: self.limit,
            });
        }
        Ok(())
    }
}

/// Returns how many bytes the writer accepted before it would block.
fn write_until_blocked<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<usize, ParticipantError> {
    let mut written = 0;
    while let Some(rest) = bytes.get(written..).filter(|rest| !rest.is_empty()) {
        match writer.write(rest) {
            Ok(0) => return Err(ParticipantError::Closed),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_transient(&e) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(written)
}
