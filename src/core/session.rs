//! Relay session
//!
//! Couples the two endpoints with the multiplexer and the relay engine and
//! runs until the engine produces a terminating result.

use std::io::Write;

use tracing::{debug, info};

use super::endpoint::{Endpoint, Role};
use super::mux::{Multiplexer, MuxError};
use super::relay::{EscapeKeys, RelayEngine, RelayResult, RelayState};

/// A running terminal ⇄ serial relay
pub struct Session<'a, D: Write> {
    terminal: &'a mut Endpoint,
    serial: &'a mut Endpoint,
    mux: Multiplexer,
    engine: RelayEngine<D>,
}

impl<'a, D: Write> Session<'a, D> {
    /// Register both endpoints for readiness. Registration failure is
    /// returned rather than leaving a relay that can never wake up.
    pub fn new(
        terminal: &'a mut Endpoint,
        serial: &'a mut Endpoint,
        keys: EscapeKeys,
        diag: D,
    ) -> Result<Self, MuxError> {
        let mux = Multiplexer::new()?;
        mux.register(&*terminal, Role::ControllingTerminal)?;
        mux.register(&*serial, Role::SerialPort)?;
        debug!("Registered {} and {}", terminal.role(), serial.role());

        Ok(Self {
            terminal,
            serial,
            mux,
            engine: RelayEngine::new(keys, diag),
        })
    }

    #[cfg(test)]
    pub fn engine(&self) -> &RelayEngine<D> {
        &self.engine
    }

    /// Relay until exit, disconnect or read failure.
    ///
    /// Ready endpoints are serviced in the order the multiplexer reports
    /// them. The first terminating result ends the session at once; events
    /// still pending from the same wait are left unserviced.
    pub fn run(&mut self) -> Result<RelayResult, MuxError> {
        info!("Relay running");
        let mut outcome = RelayResult::Continue;

        while self.engine.state() == RelayState::Running {
            for role in self.mux.wait()? {
                outcome = match role {
                    Role::ControllingTerminal => {
                        self.engine.relay_once(role, &mut *self.terminal, &mut *self.serial)
                    }
                    Role::SerialPort => {
                        self.engine.relay_once(role, &mut *self.serial, &mut *self.terminal)
                    }
                };
                if !outcome.is_continue() {
                    break;
                }
            }
        }

        info!("Relay stopped: {:?}", outcome);
        Ok(outcome)
    }
}
