//! Configuration for tinycom.
//!
//! Settings are read from `~/.tinycom/config.toml`. Every field is optional
//! and a missing file gives the stock behavior:
//!
//! ```toml
//! # Rate used when none is given on the command line
//! default_baud = "115200"
//!
//! # Print the modem control lines once the port is configured
//! status_on_start = true
//!
//! [keys]
//! exit = 0x01        # C-a
//! status = 0x18      # C-x
//! send_break = 0x13  # C-s
//!
//! [log]
//! level = "info"     # overridden by TINYCOM_LOG
//! file = true        # write ~/.tinycom/tinycom.log
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::baud;
use crate::core::EscapeKeys;

/// Directory under the home directory holding config and log
const CONFIG_DIR: &str = ".tinycom";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Control keys must be distinct (exit={exit:#04x}, status={status:#04x}, send_break={send_break:#04x})")]
    DuplicateKeys { exit: u8, status: u8, send_break: u8 },
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Baud rate name used when none is given on the command line
    pub default_baud: String,
    /// Show modem lines after the port is configured
    pub status_on_start: bool,
    /// Control keys
    pub keys: KeysConfig,
    /// Log settings
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_baud: baud::DEFAULT_BAUD_NAME.to_string(),
            status_on_start: true,
            keys: KeysConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Control key bytes typed on the terminal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub exit: u8,
    pub status: u8,
    pub send_break: u8,
}

impl Default for KeysConfig {
    fn default() -> Self {
        let keys = EscapeKeys::default();
        Self {
            exit: keys.exit,
            status: keys.status,
            send_break: keys.send_break,
        }
    }
}

impl KeysConfig {
    pub fn to_escape_keys(&self) -> EscapeKeys {
        EscapeKeys {
            exit: self.exit,
            status: self.status,
            send_break: self.send_break,
        }
    }
}

/// Log configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// tracing filter directive, e.g. "info" or "tinycom=debug"
    pub level: String,
    /// Write a log file at all
    pub file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load and validate configuration from `path`
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let KeysConfig {
            exit,
            status,
            send_break,
        } = self.keys;
        if exit == status || exit == send_break || status == send_break {
            return Err(ConfigError::DuplicateKeys {
                exit,
                status,
                send_break,
            });
        }
        Ok(())
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Log file path, creating the directory if needed
    pub fn log_path() -> PathBuf {
        if let Some(dir) = config_dir() {
            if !dir.exists() {
                let _ = fs::create_dir_all(&dir);
            }
            return dir.join("tinycom.log");
        }
        PathBuf::from("tinycom.log")
    }
}

fn config_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(CONFIG_DIR))
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_baud, "115200");
        assert_eq!(config.keys.to_escape_keys(), EscapeKeys::default());
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_toml(
            r#"
            default_baud = "9600"

            [keys]
            exit = 0x11
            "#,
        )
        .unwrap();

        assert_eq!(config.default_baud, "9600");
        assert_eq!(config.keys.exit, 0x11);
        assert_eq!(config.keys.status, 0x18);
        assert!(config.status_on_start);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = Config::from_toml("[keys]\nstatus = 0x01\n").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateKeys { .. }));
    }

    #[test]
    fn test_bad_type_rejected() {
        let err = Config::from_toml("status_on_start = \"yes\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_key_out_of_range_rejected() {
        assert!(Config::from_toml("[keys]\nexit = 300\n").is_err());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Config::load_from(Path::new("/nonexistent/tinycom.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_serialized_default_parses_back() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), Config::default());
    }
}
