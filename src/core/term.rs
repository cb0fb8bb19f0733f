//! Terminal line settings: snapshot, raw mode and restore
//!
//! [`SavedTerminalState`] holds the settings captured before an endpoint is
//! reconfigured, along with its own duplicate of the descriptor. Handles are
//! cheap clones of one shared snapshot so that the normal exit path and the
//! signal handler can both reach it. The snapshot is taken out on the first
//! restore, which makes restoration happen at most once.

use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::sync::{Arc, Mutex, PoisonError};

use nix::sys::termios::{
    self, ControlFlags, FlushArg, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices, Termios,
};
use tracing::{debug, warn};

struct Snapshot {
    fd: OwnedFd,
    termios: Termios,
}

/// Line settings captured before modification
#[derive(Clone)]
pub struct SavedTerminalState {
    label: &'static str,
    inner: Arc<Mutex<Option<Snapshot>>>,
}

impl std::fmt::Debug for SavedTerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedTerminalState")
            .field("label", &self.label)
            .field("restored", &self.is_restored())
            .finish()
    }
}

impl SavedTerminalState {
    /// Capture the current settings of `fd`
    pub fn capture<Fd: AsFd>(fd: Fd, label: &'static str) -> io::Result<Self> {
        let termios = termios::tcgetattr(fd.as_fd())?;
        let fd = fd.as_fd().try_clone_to_owned()?;
        debug!("Captured {} settings", label);
        Ok(Self {
            label,
            inner: Arc::new(Mutex::new(Some(Snapshot { fd, termios }))),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Reapply the captured settings immediately.
    ///
    /// Returns `Ok(true)` if this call restored them and `Ok(false)` if an
    /// earlier call already had.
    pub fn restore(&self) -> io::Result<bool> {
        let snapshot = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match snapshot {
            Some(snapshot) => {
                termios::tcsetattr(&snapshot.fd, SetArg::TCSANOW, &snapshot.termios)?;
                debug!("Restored {} settings", self.label);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_restored(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Copy of the captured settings, `None` once restored
    #[cfg(test)]
    pub fn settings(&self) -> Option<Termios> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.termios.clone())
    }
}

/// Put `termios` into the relay's raw mode.
///
/// Byte-at-a-time reads, no echo, no line editing, no signal characters,
/// no output processing. The line speed is kept as it was.
pub fn make_raw(settings: &mut Termios) -> io::Result<()> {
    let speed = termios::cfgetospeed(settings);

    settings.control_flags =
        ControlFlags::CS8 | ControlFlags::CRTSCTS | ControlFlags::CLOCAL | ControlFlags::CREAD;
    termios::cfsetspeed(settings, speed)?;
    settings.input_flags = InputFlags::IGNPAR;
    settings.output_flags = OutputFlags::empty();
    settings.local_flags = LocalFlags::empty();
    settings.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    settings.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    Ok(())
}

/// Raw mode on the controlling terminal for as long as the guard lives
pub struct RawModeGuard {
    saved: SavedTerminalState,
}

impl RawModeGuard {
    /// Switch the terminal captured in `saved` to raw mode.
    ///
    /// The snapshot stays locked while the new settings are applied, so a
    /// concurrent restore either runs first (and raw mode is refused) or
    /// sees raw mode already in place.
    pub fn enter(saved: SavedTerminalState) -> io::Result<Self> {
        {
            let locked = saved.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(snapshot) = locked.as_ref() else {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "terminal settings already restored",
                ));
            };

            let mut raw = snapshot.termios.clone();
            make_raw(&mut raw)?;
            termios::tcflush(&snapshot.fd, FlushArg::TCIFLUSH)?;
            termios::tcsetattr(&snapshot.fd, SetArg::TCSANOW, &raw)?;
        }
        debug!("{} in raw mode", saved.label);

        Ok(Self { saved })
    }

    /// Restore the terminal now instead of at drop
    pub fn restore(self) -> io::Result<()> {
        self.saved.restore().map(|_| ())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.saved.restore() {
            warn!("Failed to restore terminal settings: {}", e);
        }
    }
}
