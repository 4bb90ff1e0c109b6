//! Configuration for window-terminal.
//!
//! The configuration file is located at `~/.window-terminal/config.toml`.
//! Every field is optional:
//!
//! ```toml
//! [host]
//! bind_ip = "127.0.0.1"
//! poll_interval_ms = 100
//! read_buffer_size = 65536
//! max_frame_len = 1048576
//!
//! [launcher]
//! # Path of the client executable (defaults to a sibling of the current exe)
//! client_program = "/usr/local/bin/window-terminal-client"
//! # Terminal emulator prefix, overrides the platform default
//! terminal = ["xterm", "-e"]
//!
//! [log]
//! level = "debug"
//! ```

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{warn, Level};

/// Name of the per-user configuration directory under `$HOME`
const CONFIG_DIR: &str = ".window-terminal";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: HostConfig,
    pub launcher: LauncherConfig,
    pub log: LogConfig,
}

/// Listener and connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Address the listener binds to; the port is always chosen by the OS
    pub bind_ip: IpAddr,
    /// Upper bound on how long a shutdown takes to be noticed
    pub poll_interval_ms: u64,
    /// Bytes requested per receive
    pub read_buffer_size: usize,
    /// Longest undelimited frame accepted before the connection is dropped
    pub max_frame_len: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            poll_interval_ms: 100,
            read_buffer_size: 1 << 16,
            max_frame_len: 1 << 20,
        }
    }
}

impl HostConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// How terminal windows are spawned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub client_program: Option<PathBuf>,
    pub terminal: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String, // "error", "warn", "info", "debug", "trace"
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Parsed level, falling back to INFO for unknown names
    pub fn level(&self) -> Level {
        self.level.parse().unwrap_or(Level::INFO)
    }
}

impl Config {
    /// Load configuration from the default file, or defaults
    pub fn load() -> Self {
        match config_dir() {
            Some(dir) => Self::load_from(dir.join("config.toml")),
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file, or defaults
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).unwrap_or_else(|e| {
                warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                warn!("Failed to read config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(path.as_ref(), content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }
}

/// Per-user directory holding the config file and client logs
pub fn config_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(CONFIG_DIR);
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.host.bind_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.host.read_buffer_size, 65536);
        assert_eq!(config.log.level(), Level::INFO);
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_toml(
            r#"
            [host]
            poll_interval_ms = 20

            [launcher]
            terminal = ["xterm", "-e"]

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.host.poll_interval(), Duration::from_millis(20));
        assert_eq!(config.host.max_frame_len, 1 << 20);
        assert_eq!(
            config.launcher.terminal,
            Some(vec!["xterm".to_string(), "-e".to_string()])
        );
        assert_eq!(config.launcher.client_program, None);
        assert_eq!(config.log.level(), Level::DEBUG);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.host.poll_interval_ms = 42;
        config.launcher.client_program = Some(PathBuf::from("/opt/wt/client"));
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_missing_or_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_from(dir.path().join("nope.toml")), Config::default());

        let path = dir.path().join("bad.toml");
        fs::write(&path, "[host\npoll_interval_ms = ").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let log = LogConfig { level: "chatty".to_string() };
        assert_eq!(log.level(), Level::INFO);
    }
}
