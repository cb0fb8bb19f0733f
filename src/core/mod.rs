//! Core relay components.
//!
//! - **baud**: textual baud rate table
//! - **endpoint**: role-tagged descriptors and the `Channel` trait
//! - **port**: serial device open/configure/restore
//! - **term**: saved line settings and raw mode on the controlling terminal
//! - **status**: modem control line query and formatting
//! - **mux**: epoll readiness over both endpoints
//! - **relay**: chunk transfer with control-byte interception
//! - **session**: the relay loop
//! - **signals**: restore line settings on termination signals
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── Multiplexer (epoll: terminal + serial)
//! └── RelayEngine
//!     ├── ControlCommand decode (terminal → serial only)
//!     └── status report / break on the serial Channel
//!
//! RawModeGuard ─┐
//! SerialPort ───┼── SavedTerminalState ◄── SignalGuard
//! ```

pub mod baud;
pub mod endpoint;
pub mod mux;
pub mod port;
pub mod relay;
pub mod session;
pub mod signals;
pub mod status;
pub mod term;

pub use endpoint::Endpoint;
pub use port::SerialPort;
pub use relay::EscapeKeys;
pub use session::Session;
pub use signals::SignalGuard;
pub use term::RawModeGuard;
