//! tinycom - a tiny serial console
//!
//! Relays bytes between the controlling terminal and a serial device so you
//! can talk to a board's console over a raw serial link. The terminal is put
//! in raw mode for the whole session and restored on every way out,
//! including termination signals.
//!
//! # Usage
//!
//! ```text
//! tinycom /dev/ttyUSB0           # 115200 8N1
//! tinycom /dev/ttyS0 9600        # 9600 8N1
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | C-a | Exit |
//! | C-x | Show modem control lines |
//! | C-s | Send break (the key is also passed to the device) |
//!
//! Keys are only recognized at the start of what the terminal delivers in
//! one read; typed on their own they always are.

mod config;
mod core;

use std::env;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;

use anyhow::Context;
use nix::sys::termios::BaudRate;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{Config, LogConfig};
use crate::core::relay::RelayResult;
use crate::core::term::SavedTerminalState;
use crate::core::{baud, status};
use crate::core::{Endpoint, RawModeGuard, SerialPort, Session, SignalGuard};

/// Command line arguments
struct Args {
    /// Program name for the usage text
    program: String,
    /// Serial device path
    device: Option<PathBuf>,
    /// Baud rate name
    baud: Option<String>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the log filter
const LOG_ENV: &str = "TINYCOM_LOG";

fn print_version() {
    eprintln!("tinycom {}", VERSION);
}

fn print_usage(program: &str) {
    eprintln!("example: {} /dev/ttyS0 [115200]", program);
    eprintln!();
    eprintln!("available baud rates:");
    eprint!("{}", baud::table());
    eprintln!();
}

fn print_help(program: &str) {
    eprintln!("tinycom {} - a tiny serial console", VERSION);
    eprintln!();
    eprintln!("Usage: {} <device> [baud]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -h, --help            Show this help");
    eprintln!("  -V, --version         Show version");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  C-a                   Exit");
    eprintln!("  C-x                   Show modem control lines");
    eprintln!("  C-s                   Send break");
    eprintln!();
    print_usage(program);
    eprintln!("Configuration: ~/.tinycom/config.toml");
}

fn parse_args() -> Result<Args, String> {
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "tinycom".to_string());
    let mut parsed = Args {
        program,
        device: None,
        baud: None,
    };

    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help(&parsed.program);
                std::process::exit(0);
            }
            "-V" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            _ if parsed.device.is_none() => parsed.device = Some(PathBuf::from(arg)),
            _ if parsed.baud.is_none() => parsed.baud = Some(arg),
            _ => return Err(format!("Unexpected argument: {}. Use -h for help.", arg)),
        }
    }

    Ok(parsed)
}

fn init_logging(log: &LogConfig) {
    if !log.file {
        return;
    }

    let log_path = Config::log_path();
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_new(&log.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let Some(device) = args.device else {
        print_usage(&args.program);
        std::process::exit(1);
    };

    let (config, config_error) = match Config::load() {
        Ok(c) => (c, None),
        Err(e) => (Config::default(), Some(e)),
    };
    init_logging(&config.log);
    info!("tinycom {} starting", VERSION);

    if let Some(e) = config_error {
        warn!("{}; using defaults", e);
        eprintln!("tinycom: {}; using defaults", e);
    }

    let port = match SerialPort::open(&device) {
        Ok(p) => p,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            std::process::exit(-1);
        }
    };

    let code = match run(port, args.baud.as_deref(), &config) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("tinycom: {:#}", e);
            1
        }
    };

    info!("tinycom exiting with {}", code);
    std::process::exit(code);
}

/// Resolve the speed, install the signal guard and relay on the
/// controlling terminal.
fn run(mut port: SerialPort, baud_name: Option<&str>, config: &Config) -> anyhow::Result<i32> {
    let requested = baud_name.unwrap_or(&config.default_baud);
    let (speed, matched) = baud::resolve(Some(requested));
    match matched {
        Some(name) if baud_name.is_some() => eprintln!("setting speed {}", name),
        Some(_) => {}
        None => info!("Unknown baud rate {:?}, using {}", requested, baud::DEFAULT_BAUD_NAME),
    }

    eprintln!("{}", config.keys.to_escape_keys().banner());

    let signals = match SignalGuard::install() {
        Ok(guard) => Some(guard),
        Err(e) => {
            warn!("Signal handler not installed: {}", e);
            None
        }
    };

    let terminal = Endpoint::terminal().context("Failed to open controlling terminal")?;
    relay(terminal, &mut port, speed, config, signals.as_ref())
}

fn watch(signals: Option<&SignalGuard>, state: &SavedTerminalState) {
    if let Some(guard) = signals {
        guard.watch(state.clone());
    }
}

/// Configure both endpoints, relay, and put everything back.
///
/// Each snapshot is handed to `signals` before its endpoint is changed.
/// Line settings are restored by the guards on every return path; the
/// normal path restores explicitly, serial port first.
fn relay(
    mut terminal: Endpoint,
    port: &mut SerialPort,
    speed: BaudRate,
    config: &Config,
    signals: Option<&SignalGuard>,
) -> anyhow::Result<i32> {
    let raw_mode = if terminal.is_tty() {
        let saved = SavedTerminalState::capture(&terminal, "terminal")
            .context("Failed to read terminal settings")?;
        watch(signals, &saved);
        Some(RawModeGuard::enter(saved).context("Failed to enter raw mode")?)
    } else {
        warn!("stdin is not a terminal, leaving it as is");
        None
    };

    let saved = port
        .capture()
        .with_context(|| format!("Failed to read {} settings", port.path().display()))?;
    watch(signals, &saved);
    port.configure(speed)
        .with_context(|| format!("Failed to configure {}", port.path().display()))?;
    match port.speed() {
        Ok(applied) => info!(
            "{} configured at {}",
            port.path().display(),
            baud::name_of(applied).unwrap_or("an unlisted rate")
        ),
        Err(e) => warn!("{}", e),
    }

    if config.status_on_start {
        eprint!("{}", status::report(port.endpoint()));
    }

    let keys = config.keys.to_escape_keys();
    let result = {
        let mut session = Session::new(&mut terminal, port.endpoint_mut(), keys, io::stderr())
            .context("Failed to set up event multiplexer")?;
        session.run().context("Relay loop failed")?
    };

    match &result {
        RelayResult::RequestExit => info!("Exit requested by operator"),
        RelayResult::EndpointClosed(role) => warn!("{} closed", role),
        RelayResult::ReadFailed(role, e) => warn!("Reading {} failed: {}", role, e),
        RelayResult::Continue => {}
    }

    if let Err(e) = port.restore() {
        error!("Failed to restore {}: {}", port.path().display(), e);
    }
    if let Some(guard) = raw_mode {
        if let Err(e) = guard.restore() {
            error!("Failed to restore terminal: {}", e);
        }
    }

    Ok(0)
}
