//! Serial port setup
//!
//! Opens the device without making it the controlling terminal and without
//! blocking on carrier detect, then applies 8N1 raw line settings at the
//! requested speed. The settings found on the port are saved and put back
//! when the port is restored or dropped.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::libc;
use nix::sys::termios::{
    self, BaudRate, ControlFlags, FlushArg, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::endpoint::{Endpoint, Role};
use super::term::SavedTerminalState;

#[derive(Error, Debug)]
pub enum PortError {
    #[error("{}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read port settings: {0}")]
    Capture(#[source] io::Error),

    #[error("Failed to apply port settings: {0}")]
    Configure(#[source] io::Error),

    #[error("Failed to query port settings: {0}")]
    Query(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, PortError>;

/// An open serial device
#[derive(Debug)]
pub struct SerialPort {
    path: PathBuf,
    endpoint: Endpoint,
    saved: Option<SavedTerminalState>,
}

impl SerialPort {
    /// Open `path` for reading and writing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| PortError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Opened {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            endpoint: Endpoint::new(Role::SerialPort, OwnedFd::from(file)),
            saved: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    /// Snapshot the settings found on the device.
    ///
    /// Only the first call reads the device; later calls hand out the same
    /// snapshot, so [`restore`](Self::restore) always returns the port to
    /// how it was found.
    pub fn capture(&mut self) -> Result<SavedTerminalState> {
        if let Some(saved) = &self.saved {
            return Ok(saved.clone());
        }

        let saved = SavedTerminalState::capture(self.endpoint.as_fd(), "serial port")
            .map_err(PortError::Capture)?;
        self.saved = Some(saved.clone());
        Ok(saved)
    }

    /// Apply 8N1 raw settings at `speed`.
    ///
    /// Any input already buffered on the device is discarded first so that
    /// stale bytes are not replayed into the session. Settings found on the
    /// device are [captured](Self::capture) first if they have not been.
    pub fn configure(&mut self, speed: BaudRate) -> Result<()> {
        self.capture()?;
        let fd = self.endpoint.as_fd();
        let mut settings = termios::tcgetattr(fd).map_err(|e| PortError::Capture(e.into()))?;

        // CLOCAL ignores modem status, and no HUPCL means closing the port
        // leaves DTR alone.
        settings.control_flags = ControlFlags::CS8 | ControlFlags::CLOCAL | ControlFlags::CREAD;
        termios::cfsetspeed(&mut settings, speed).map_err(|e| PortError::Configure(e.into()))?;
        settings.input_flags = InputFlags::IGNPAR;
        settings.output_flags = OutputFlags::empty();
        settings.local_flags = LocalFlags::empty();
        settings.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        settings.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

        termios::tcflush(fd, FlushArg::TCIFLUSH).map_err(|e| PortError::Configure(e.into()))?;
        termios::tcsetattr(fd, SetArg::TCSANOW, &settings)
            .map_err(|e| PortError::Configure(e.into()))?;

        debug!("Configured {} at {:?}", self.path.display(), speed);
        Ok(())
    }

    /// Output speed currently applied to the device
    pub fn speed(&self) -> Result<BaudRate> {
        let settings =
            termios::tcgetattr(self.endpoint.as_fd()).map_err(|e| PortError::Query(e.into()))?;
        Ok(termios::cfgetospeed(&settings))
    }

    /// Put back the settings found by [`capture`](Self::capture)
    pub fn restore(&self) -> io::Result<()> {
        if let Some(saved) = &self.saved {
            saved.restore()?;
        }
        Ok(())
    }
}

impl AsFd for SerialPort {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.endpoint.as_fd()
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("Failed to restore {} settings: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::baud;
    use crate::core::term::tests::same_settings;
    use nix::pty::{openpty, OpenptyResult};
    use std::os::fd::AsRawFd;

    fn pty_path(pty: &OpenptyResult) -> PathBuf {
        std::fs::read_link(format!("/proc/self/fd/{}", pty.slave.as_raw_fd())).unwrap()
    }

    #[test]
    fn test_open_missing_device() {
        let err = SerialPort::open("/dev/this-device-does-not-exist").unwrap_err();
        assert!(matches!(err, PortError::Open { .. }));
        assert!(err.to_string().starts_with("/dev/this-device-does-not-exist: "));
    }

    #[test]
    fn test_default_speed_applied() {
        let pty = openpty(None, None).unwrap();
        let mut port = SerialPort::open(pty_path(&pty)).unwrap();

        let (speed, matched) = baud::resolve(None);
        assert_eq!(matched, None);
        port.configure(speed).unwrap();
        assert_eq!(port.speed().unwrap(), BaudRate::B115200);
    }

    #[test]
    fn test_named_speed_applied() {
        let pty = openpty(None, None).unwrap();
        let mut port = SerialPort::open(pty_path(&pty)).unwrap();

        let (speed, matched) = baud::resolve(Some("9600"));
        assert_eq!(matched, Some("9600"));
        port.configure(speed).unwrap();
        assert_eq!(port.speed().unwrap(), BaudRate::B9600);
    }

    #[test]
    fn test_unknown_speed_falls_back() {
        let pty = openpty(None, None).unwrap();
        let mut port = SerialPort::open(pty_path(&pty)).unwrap();

        let (speed, _) = baud::resolve(Some("999999"));
        port.configure(speed).unwrap();
        assert_eq!(port.speed().unwrap(), BaudRate::B115200);
    }

    #[test]
    fn test_configure_applies_raw_8n1() {
        let pty = openpty(None, None).unwrap();
        let mut port = SerialPort::open(pty_path(&pty)).unwrap();
        port.configure(BaudRate::B57600).unwrap();

        let applied = termios::tcgetattr(&pty.slave).unwrap();
        assert!(applied.control_flags.contains(ControlFlags::CS8));
        assert!(applied.control_flags.contains(ControlFlags::CLOCAL | ControlFlags::CREAD));
        assert!(!applied.control_flags.contains(ControlFlags::PARENB));
        assert!(!applied.control_flags.contains(ControlFlags::HUPCL));
        assert!(!applied.local_flags.contains(LocalFlags::ICANON));
        assert!(!applied.local_flags.contains(LocalFlags::ECHO));
        assert_eq!(applied.control_chars[SpecialCharacterIndices::VMIN as usize], 1);
        assert_eq!(applied.control_chars[SpecialCharacterIndices::VTIME as usize], 0);
    }

    #[test]
    fn test_restore_on_drop() {
        let pty = openpty(None, None).unwrap();
        let before = termios::tcgetattr(&pty.slave).unwrap();
        {
            let mut port = SerialPort::open(pty_path(&pty)).unwrap();
            port.configure(BaudRate::B9600).unwrap();
        }
        let after = termios::tcgetattr(&pty.slave).unwrap();
        assert!(same_settings(&before, &after));
    }

    #[test]
    fn test_reconfigure_keeps_first_snapshot() {
        let pty = openpty(None, None).unwrap();
        let before = termios::tcgetattr(&pty.slave).unwrap();
        let mut port = SerialPort::open(pty_path(&pty)).unwrap();
        port.configure(BaudRate::B9600).unwrap();
        port.configure(BaudRate::B19200).unwrap();
        assert_eq!(port.speed().unwrap(), BaudRate::B19200);

        port.restore().unwrap();
        let after = termios::tcgetattr(&pty.slave).unwrap();
        assert!(same_settings(&before, &after));
        assert!(port.capture().unwrap().is_restored());
    }

    #[test]
    fn test_capture_before_configure_is_kept() {
        let pty = openpty(None, None).unwrap();
        let before = termios::tcgetattr(&pty.slave).unwrap();
        let mut port = SerialPort::open(pty_path(&pty)).unwrap();

        let saved = port.capture().unwrap();
        port.configure(BaudRate::B38400).unwrap();
        assert!(!saved.is_restored());

        drop(port);
        assert!(saved.is_restored());
        let after = termios::tcgetattr(&pty.slave).unwrap();
        assert!(same_settings(&before, &after));
    }
}
