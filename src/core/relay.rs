//! Relay engine
//!
//! Moves one chunk at a time from a ready endpoint to the other side.
//! Data typed on the controlling terminal may start with a control byte,
//! which is interpreted instead of (or, for break, in addition to) being
//! forwarded. Only the first byte of each chunk is inspected, so a control
//! byte that arrives after other data in the same read is forwarded as data.
//!
//! ```text
//!            read ≤ 256 bytes
//! source ─────────────────────► chunk ──► decode first byte (control source only)
//!                                          │
//!              ┌───────────┬───────────────┼──────────────┐
//!              ▼           ▼               ▼              ▼
//!            Exit     QueryStatus      SendBreak         Data
//!         (stop, drop) (report, drop)  (break, forward)  (forward)
//! ```

use std::io::{self, ErrorKind, Read, Write};

use tracing::{debug, error, info, trace, warn};

use super::endpoint::{Channel, Role};
use super::status;

/// Largest chunk moved per readiness event
pub const CHUNK_SIZE: usize = 256;

/// Control bytes recognized on the controlling terminal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EscapeKeys {
    pub exit: u8,
    pub status: u8,
    pub send_break: u8,
}

impl Default for EscapeKeys {
    fn default() -> Self {
        Self {
            exit: 0x01,       // C-a
            status: 0x18,     // C-x
            send_break: 0x13, // C-s
        }
    }
}

impl EscapeKeys {
    /// Human readable name of a key byte, e.g. `C-a`
    pub fn label(byte: u8) -> String {
        match byte {
            0x01..=0x1a => format!("C-{}", (b'a' + byte - 1) as char),
            _ => format!("0x{:02x}", byte),
        }
    }

    /// One-line key help shown before the session starts
    pub fn banner(&self) -> String {
        format!(
            "{} exit, {} modem lines status, {} send break",
            Self::label(self.exit),
            Self::label(self.status),
            Self::label(self.send_break),
        )
    }
}

/// Command carried by the first byte of a terminal chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Exit,
    QueryStatus,
    SendBreak,
    /// Ordinary data
    Data,
}

impl ControlCommand {
    /// Decode the command at the start of `chunk`
    pub fn decode(chunk: &[u8], keys: &EscapeKeys) -> Self {
        match chunk.first() {
            Some(&b) if b == keys.exit => ControlCommand::Exit,
            Some(&b) if b == keys.status => ControlCommand::QueryStatus,
            Some(&b) if b == keys.send_break => ControlCommand::SendBreak,
            _ => ControlCommand::Data,
        }
    }
}

/// Outcome of one relay attempt
#[derive(Debug)]
pub enum RelayResult {
    Continue,
    /// The operator pressed the exit key
    RequestExit,
    /// A read returned no data: the endpoint went away
    EndpointClosed(Role),
    /// A read failed with a non-transient error
    ReadFailed(Role, io::Error),
}

impl RelayResult {
    pub fn is_continue(&self) -> bool {
        matches!(self, RelayResult::Continue)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayState {
    Running,
    Terminating,
}

/// Chunked relay with control-byte interception.
///
/// Diagnostics meant for the operator (status lines, break notices,
/// disconnect and error messages) go to `diag`, normally stderr.
pub struct RelayEngine<D: Write> {
    keys: EscapeKeys,
    diag: D,
    state: RelayState,
    buf: [u8; CHUNK_SIZE],
}

impl<D: Write> RelayEngine<D> {
    pub fn new(keys: EscapeKeys, diag: D) -> Self {
        Self {
            keys,
            diag,
            state: RelayState::Running,
            buf: [0; CHUNK_SIZE],
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    #[cfg(test)]
    pub fn diagnostics(&self) -> &D {
        &self.diag
    }

    /// Write an operator-facing line to the diagnostic stream
    pub fn notify(&mut self, message: &str) {
        let _ = self.diag.write_all(message.as_bytes());
        let _ = self.diag.flush();
    }

    /// Relay one chunk from `source` to `destination`.
    ///
    /// `from` names the source for diagnostics; control bytes are only
    /// interpreted when it is the controlling terminal. Any result other
    /// than `Continue` moves the engine to `Terminating`.
    pub fn relay_once<S, T>(&mut self, from: Role, source: &mut S, destination: &mut T) -> RelayResult
    where
        S: Read + ?Sized,
        T: Channel + ?Sized,
    {
        if self.state == RelayState::Terminating {
            warn!("Relay called after termination");
        }

        let result = self.transfer(from, source, destination);
        if !result.is_continue() {
            debug!("Relay terminating: {:?}", result);
            self.state = RelayState::Terminating;
        }
        result
    }

    fn transfer<S, T>(&mut self, from: Role, source: &mut S, destination: &mut T) -> RelayResult
    where
        S: Read + ?Sized,
        T: Channel + ?Sized,
    {
        let n = loop {
            match source.read(&mut self.buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Read from {} failed: {}", from, e);
                    self.notify(&format!("read: {}\r\n", e));
                    return RelayResult::ReadFailed(from, e);
                }
            }
        };

        if n == 0 {
            info!("{} closed", from);
            self.notify("\r\nnothing to read. probably port disconnected.\r\n");
            return RelayResult::EndpointClosed(from);
        }
        trace!("{} bytes from {}", n, from);

        if from == Role::ControllingTerminal {
            match ControlCommand::decode(&self.buf[..n], &self.keys) {
                ControlCommand::Exit => {
                    info!("Exit requested");
                    return RelayResult::RequestExit;
                }
                ControlCommand::QueryStatus => {
                    let line = status::report(&*destination);
                    self.notify(&line);
                    return RelayResult::Continue;
                }
                ControlCommand::SendBreak => {
                    self.notify("sending break...\r\n");
                    if let Err(e) = destination.send_break() {
                        warn!("Break failed: {}", e);
                    }
                    // The break key itself is still forwarded with the chunk.
                }
                ControlCommand::Data => {}
            }
        }

        if let Err((remaining, e)) = forward(&self.buf[..n], destination) {
            warn!("Write failed, dropping {} bytes: {}", remaining, e);
            self.notify(&format!("write failed: {}\r\n", e));
        }
        RelayResult::Continue
    }
}

/// Write `chunk` fully, retrying transient errors.
///
/// Any other error ends the write; the unwritten byte count is returned
/// with it and the rest of the chunk is dropped.
fn forward<T: Write + ?Sized>(chunk: &[u8], destination: &mut T) -> Result<(), (usize, io::Error)> {
    let mut pending = chunk;
    while !pending.is_empty() {
        match destination.write(pending) {
            Ok(0) => return Err((pending.len(), io::Error::from(ErrorKind::WriteZero))),
            Ok(written) => pending = &pending[written..],
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {}
            Err(e) => return Err((pending.len(), e)),
        }
    }
    Ok(())
}
