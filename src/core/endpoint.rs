//! Relay endpoints
//!
//! An [`Endpoint`] is an open descriptor tagged with the [`Role`] it plays in
//! the relay. Reads and writes go straight to the descriptor with no
//! userspace buffering, so readiness reported by the multiplexer always
//! matches what a read will return.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use crossterm::tty::IsTty;
use nix::sys::termios;

use super::status::{self, ModemLines};

/// Which side of the relay an endpoint is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The operator's terminal (descriptor 0)
    ControllingTerminal,
    /// The serial device
    SerialPort,
}

impl Role {
    /// Readiness token registered with the multiplexer
    pub fn token(self) -> u64 {
        match self {
            Role::ControllingTerminal => 0,
            Role::SerialPort => 1,
        }
    }

    pub fn from_token(token: u64) -> Option<Self> {
        match token {
            0 => Some(Role::ControllingTerminal),
            1 => Some(Role::SerialPort),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::ControllingTerminal => write!(f, "terminal"),
            Role::SerialPort => write!(f, "serial port"),
        }
    }
}

/// Line-level operations the relay needs beyond plain byte I/O
pub trait Channel: Read + Write {
    /// Send a break condition on the line
    fn send_break(&mut self) -> io::Result<()>;

    /// Query the modem control lines
    fn modem_lines(&self) -> io::Result<ModemLines>;
}

/// An open descriptor with a relay role
#[derive(Debug)]
pub struct Endpoint {
    role: Role,
    file: File,
}

impl Endpoint {
    pub fn new(role: Role, fd: OwnedFd) -> Self {
        Self {
            role,
            file: File::from(fd),
        }
    }

    /// The controlling terminal, as a duplicate of descriptor 0
    pub fn terminal() -> io::Result<Self> {
        let fd = io::stdin().as_fd().try_clone_to_owned()?;
        Ok(Self::new(Role::ControllingTerminal, fd))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the descriptor refers to a terminal device
    pub fn is_tty(&self) -> bool {
        self.file.is_tty()
    }
}

impl AsFd for Endpoint {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for Endpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Channel for Endpoint {
    fn send_break(&mut self) -> io::Result<()> {
        termios::tcsendbreak(&self.file, 0)?;
        Ok(())
    }

    fn modem_lines(&self) -> io::Result<ModemLines> {
        status::query(&self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_role_tokens_round_trip() {
        for role in [Role::ControllingTerminal, Role::SerialPort] {
            assert_eq!(Role::from_token(role.token()), Some(role));
        }
        assert_eq!(Role::from_token(7), None);
    }

    #[test]
    fn test_endpoint_io_is_unbuffered() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut endpoint = Endpoint::new(Role::SerialPort, OwnedFd::from(a));

        endpoint.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        b.write_all(b"pong").unwrap();
        endpoint.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
        assert!(!endpoint.is_tty());
    }

    #[test]
    fn test_socket_has_no_modem_lines() {
        let (a, _b) = UnixStream::pair().unwrap();
        let endpoint = Endpoint::new(Role::SerialPort, OwnedFd::from(a));
        assert!(endpoint.modem_lines().is_err());
    }
}
