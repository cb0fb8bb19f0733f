//! Restore saved line settings when the process is told to terminate.
//!
//! Raw mode disables the terminal's own signal characters, so these only
//! arrive from outside (`kill`, a closing terminal emulator, ...). A
//! dedicated thread waits for them, restores every watched snapshot and
//! exits with `128 + signal`.
//!
//! Install the guard before touching any line settings and watch each
//! snapshot as soon as it is captured; a signal then never finds an
//! endpoint changed but unwatched.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::{error, warn};

use super::term::SavedTerminalState;

const TERMINATION_SIGNALS: [i32; 4] = [SIGINT, SIGTERM, SIGHUP, SIGQUIT];

/// Restores `states` in order, logging failures. Returns how many were
/// restored by this call.
pub fn restore_all(states: &[SavedTerminalState]) -> usize {
    let mut restored = 0;
    for state in states {
        match state.restore() {
            Ok(true) => restored += 1,
            Ok(false) => {}
            Err(e) => error!("Failed to restore {} settings: {}", state.label(), e),
        }
    }
    restored
}

/// Background signal listener, stopped on drop
#[derive(Debug)]
pub struct SignalGuard {
    handle: Handle,
    watched: Arc<Mutex<Vec<SavedTerminalState>>>,
    thread: Option<JoinHandle<()>>,
}

impl SignalGuard {
    /// Install the listener with nothing to restore yet
    pub fn install() -> io::Result<Self> {
        let mut signals = Signals::new(TERMINATION_SIGNALS)?;
        let handle = signals.handle();
        let watched = Arc::new(Mutex::new(Vec::new()));
        let states = Arc::clone(&watched);
        let thread = std::thread::Builder::new()
            .name("tinycom-signals".to_string())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    warn!("Termination signal {} received, restoring line settings", signal);
                    let states = states.lock().unwrap_or_else(PoisonError::into_inner).clone();
                    restore_all(&states);
                    std::process::exit(128 + signal);
                }
            })?;

        Ok(Self {
            handle,
            watched,
            thread: Some(thread),
        })
    }

    /// Restore `state` on a termination signal.
    ///
    /// The most recently watched state is restored first, undoing changes
    /// in the reverse of the order they were made.
    pub fn watch(&self, state: SavedTerminalState) {
        self.watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(0, state);
    }

    /// States a signal would restore, in restore order
    #[cfg(test)]
    pub fn watched(&self) -> Vec<SavedTerminalState> {
        self.watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::pty::openpty;

    #[test]
    fn test_restore_all_counts_once() {
        let a = openpty(None, None).unwrap();
        let b = openpty(None, None).unwrap();
        let states = vec![
            SavedTerminalState::capture(&a.slave, "a").unwrap(),
            SavedTerminalState::capture(&b.slave, "b").unwrap(),
        ];

        assert_eq!(restore_all(&states), 2);
        assert_eq!(restore_all(&states), 0);
    }

    #[test]
    fn test_guard_stops_on_drop() {
        let pty = openpty(None, None).unwrap();
        let state = SavedTerminalState::capture(&pty.slave, "pty").unwrap();
        let guard = SignalGuard::install().unwrap();
        guard.watch(state.clone());
        drop(guard);
        assert!(!state.is_restored());
    }

    #[test]
    fn test_latest_watched_restores_first() {
        let terminal = openpty(None, None).unwrap();
        let serial = openpty(None, None).unwrap();
        let guard = SignalGuard::install().unwrap();
        assert!(guard.watched().is_empty());

        guard.watch(SavedTerminalState::capture(&terminal.slave, "terminal").unwrap());
        guard.watch(SavedTerminalState::capture(&serial.slave, "serial port").unwrap());

        let labels: Vec<_> = guard.watched().iter().map(|s| s.label()).collect();
        assert_eq!(labels, ["serial port", "terminal"]);
    }
}
