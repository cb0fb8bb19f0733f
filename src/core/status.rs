//! Modem control line status
//!
//! Queries DTR/RTS/CTS/DSR/DCD/RI and renders the asserted set as the
//! one-line diagnostic shown at startup and on the status key.

use std::io;
use std::os::fd::{AsFd, AsRawFd};

use bitflags::bitflags;
use nix::libc;

use super::endpoint::Channel;

bitflags! {
    /// Asserted modem control lines
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ModemLines: libc::c_int {
        const DTR = libc::TIOCM_DTR;
        const RTS = libc::TIOCM_RTS;
        const CTS = libc::TIOCM_CTS;
        const DSR = libc::TIOCM_DSR;
        const DCD = libc::TIOCM_CAR;
        const RI  = libc::TIOCM_RNG;
    }
}

/// Display order and labels of the status line
const LABELS: [(ModemLines, &str); 6] = [
    (ModemLines::RTS, "RTS"),
    (ModemLines::CTS, "CTS"),
    (ModemLines::DSR, "DSR"),
    (ModemLines::DCD, "DCD"),
    (ModemLines::DTR, "DTR"),
    (ModemLines::RI, "RI"),
];

mod ioctl {
    nix::ioctl_read_bad!(tiocmget, nix::libc::TIOCMGET, nix::libc::c_int);
}

/// Read the modem control lines of a serial descriptor
pub fn query<Fd: AsFd>(fd: Fd) -> io::Result<ModemLines> {
    let mut bits: libc::c_int = 0;
    // SAFETY: TIOCMGET writes a single c_int into `bits`, which outlives the call.
    unsafe { ioctl::tiocmget(fd.as_fd().as_raw_fd(), &mut bits) }?;
    Ok(ModemLines::from_bits_truncate(bits))
}

/// Render asserted lines as space-terminated tokens, e.g. `"RTS DTR "`
pub fn format_lines(lines: ModemLines) -> String {
    LABELS
        .iter()
        .filter(|(flag, _)| lines.contains(*flag))
        .map(|(_, label)| format!("{} ", label))
        .collect()
}

/// Build the status line for a channel.
///
/// The line is CR-LF terminated since it is printed while the terminal
/// is in raw mode.
pub fn report<C: Channel + ?Sized>(channel: &C) -> String {
    match channel.modem_lines() {
        Ok(lines) => format!("[STATUS]: {}\r\n", format_lines(lines)),
        Err(e) => {
            tracing::warn!("Modem status query failed: {}", e);
            format!("[STATUS]: unavailable ({})\r\n", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    struct FixedLines(io::Result<ModemLines>);

    impl Read for FixedLines {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for FixedLines {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Channel for FixedLines {
        fn send_break(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn modem_lines(&self) -> io::Result<ModemLines> {
            match &self.0 {
                Ok(lines) => Ok(*lines),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    #[test]
    fn test_format_uses_legacy_order() {
        let all = ModemLines::all();
        assert_eq!(format_lines(all), "RTS CTS DSR DCD DTR RI ");
        assert_eq!(format_lines(ModemLines::DTR | ModemLines::RTS), "RTS DTR ");
        assert_eq!(format_lines(ModemLines::empty()), "");
    }

    #[test]
    fn test_report_line() {
        let channel = FixedLines(Ok(ModemLines::CTS | ModemLines::DCD));
        assert_eq!(report(&channel), "[STATUS]: CTS DCD \r\n");
    }

    #[test]
    fn test_report_when_query_fails() {
        let channel = FixedLines(Err(io::Error::from_raw_os_error(libc::ENOTTY)));
        let line = report(&channel);
        assert!(line.starts_with("[STATUS]: unavailable ("));
        assert!(line.ends_with(")\r\n"));
    }
}
