//! window-terminal-client - the process inside a spawned terminal window
//!
//! Launched by the host with the window identifier and the host listener
//! address. Connects back, announces the identifier and then prints, prompts
//! and closes as the host commands.
//!
//! ```text
//! window-terminal-client <IDENTIFIER> <HOST> <PORT>
//! ```
//!
//! Logs go to `~/.window-terminal/client.log`; stdout belongs to the window.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use tracing::{error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use window_terminal::client::{ClientExit, StdConsole, TerminalClient};
use window_terminal::config::{config_dir, Config};
use window_terminal::WindowId;

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Positional arguments passed by the host
struct Args {
    identifier: WindowId,
    address: SocketAddr,
}

fn print_help() {
    eprintln!("window-terminal-client {} - terminal side of window-terminal", VERSION);
    eprintln!();
    eprintln!("Usage: window-terminal-client <IDENTIFIER> <HOST> <PORT>");
    eprintln!();
    eprintln!("Started by the host process for each window; not meant to be run by hand.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Configuration: ~/.window-terminal/config.toml");
}

fn parse_args() -> Result<Args, String> {
    let mut positional = Vec::new();

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                eprintln!("window-terminal-client {}", VERSION);
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => {
                return Err(format!("Unknown argument: {}. Use -h for help.", flag));
            }
            _ => positional.push(arg),
        }
    }

    let [identifier, host, port] = <[String; 3]>::try_from(positional)
        .map_err(|got| format!("Expected 3 arguments, got {}", got.len()))?;

    let identifier = identifier
        .parse::<WindowId>()
        .map_err(|e| e.to_string())?;
    let host = host
        .parse::<IpAddr>()
        .map_err(|e| format!("Invalid host '{}': {}", host, e))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("Invalid port '{}': {}", port, e))?;

    Ok(Args {
        identifier,
        address: SocketAddr::new(host, port),
    })
}

/// `RUST_LOG` wins over the configured level when set and valid
fn log_filter(level: Level, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()))
}

/// Log to a file; stdout is the window's display
fn init_logging(config: &Config) {
    let log_path = config_dir()
        .map(|dir| dir.join("client.log"))
        .unwrap_or_else(|| PathBuf::from("window-terminal-client.log"));

    // Open log file (append mode)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(log_filter(
                config.log.level(),
                env::var("RUST_LOG").ok().as_deref(),
            ))
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let config = Config::load();
    init_logging(&config);
    info!("window-terminal-client {} starting for window {}", VERSION, args.identifier);

    let console = StdConsole::new();
    let short_id: String = args.identifier.to_string().chars().take(8).collect();
    if let Err(e) = console.set_title(&format!("Window Terminal {}", short_id)) {
        info!("Could not set window title: {}", e);
    }

    let client = TerminalClient::connect(args.identifier, args.address, &config.host)
        .with_context(|| format!("Failed to connect to host at {}", args.address))?;

    match client.run(console) {
        Ok(ClientExit::Closed) => info!("Closed by host"),
        Ok(ClientExit::HostDisconnected) => info!("Host went away"),
        Ok(ClientExit::ConsoleClosed) => info!("Console input ended"),
        Err(e) => {
            error!("Session failed: {}", e);
            return Err(e).context("Window session failed");
        }
    }

    // The console worker may still be blocked on stdin
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_uses_configured_level() {
        let configured = log_filter(Level::DEBUG, None).to_string();
        assert_eq!(configured.to_lowercase(), "debug");
        let invalid = log_filter(Level::WARN, Some("window_terminal=loudest")).to_string();
        assert_eq!(invalid.to_lowercase(), "warn");
    }

    #[test]
    fn test_log_filter_prefers_rust_log() {
        let filter = log_filter(Level::INFO, Some("window_terminal=trace")).to_string();
        assert_eq!(filter.to_lowercase(), "window_terminal=trace");
    }
}
