//! Readiness multiplexing over the relay endpoints (epoll)

use std::os::fd::AsFd;

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use thiserror::Error;
use tracing::{trace, warn};

use super::endpoint::Role;

/// Events collected per wait
const MAX_EVENTS: usize = 5;

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("Failed to create event multiplexer: {0}")]
    Create(#[source] Errno),

    #[error("Failed to register {role}: {source}")]
    Register {
        role: Role,
        #[source]
        source: Errno,
    },

    #[error("Failed waiting for events: {0}")]
    Wait(#[source] Errno),
}

pub type Result<T> = std::result::Result<T, MuxError>;

/// Blocks until at least one registered endpoint is readable
pub struct Multiplexer {
    epoll: Epoll,
    events: [EpollEvent; MAX_EVENTS],
}

impl Multiplexer {
    pub fn new() -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(MuxError::Create)?;
        Ok(Self {
            epoll,
            events: [EpollEvent::empty(); MAX_EVENTS],
        })
    }

    /// Watch `fd` for read readiness, reported as `role`
    pub fn register<Fd: AsFd>(&self, fd: Fd, role: Role) -> Result<()> {
        self.epoll
            .add(fd, EpollEvent::new(EpollFlags::EPOLLIN, role.token()))
            .map_err(|source| MuxError::Register { role, source })
    }

    /// Wait with no timeout and return the ready roles in reported order.
    ///
    /// Hang-up and error conditions are reported too; the following read
    /// is what tells the relay the endpoint is gone.
    pub fn wait(&mut self) -> Result<Vec<Role>> {
        let n = loop {
            match self.epoll.wait(&mut self.events, EpollTimeout::NONE) {
                Ok(n) => break n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(MuxError::Wait(e)),
            }
        };

        let mut ready = Vec::with_capacity(n);
        for event in &self.events[..n] {
            match Role::from_token(event.data()) {
                Some(role) => {
                    trace!("{} ready ({:?})", role, event.events());
                    ready.push(role);
                }
                None => warn!("Ignoring event for unknown token {}", event.data()),
            }
        }
        Ok(ready)
    }
}
