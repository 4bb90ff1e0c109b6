//! Spawning terminal processes
//!
//! A launched terminal runs `window-terminal-client <identifier> <host> <port>`
//! in a window of its own and connects back to the host listener.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, warn};

use crate::config::LauncherConfig;
use crate::error::{Result, WindowError};
use crate::protocol::WindowId;

/// Executable name of the client runtime
pub const CLIENT_PROGRAM: &str = "window-terminal-client";

/// What a launcher needs to start one terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub identifier: WindowId,
    /// Host listener address passed to the client
    pub address: SocketAddr,
}

impl LaunchRequest {
    /// Positional arguments of the client process
    pub fn client_args(&self) -> [String; 3] {
        [
            self.identifier.to_string(),
            self.address.ip().to_string(),
            self.address.port().to_string(),
        ]
    }
}

/// Starts a detached terminal process for a window
pub trait Launcher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> Result<()>;
}

/// How the client is put into a window of its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchRecipe {
    /// Fresh console window (Windows)
    NewConsole,
    /// Run under a terminal emulator, e.g. `gnome-terminal --`
    Emulator(Vec<String>),
}

impl LaunchRecipe {
    /// Recipe for an OS name as reported by `std::env::consts::OS`.
    /// A configured terminal prefix wins over the platform default.
    pub fn for_os(os: &str, config: &LauncherConfig) -> Result<Self> {
        if let Some(prefix) = config.terminal.as_ref().filter(|p| !p.is_empty()) {
            return Ok(LaunchRecipe::Emulator(prefix.clone()));
        }
        match os {
            "windows" => Ok(LaunchRecipe::NewConsole),
            "linux" => Ok(LaunchRecipe::Emulator(vec![
                "gnome-terminal".to_string(),
                "--".to_string(),
            ])),
            other => Err(WindowError::PlatformUnsupported(other.to_string())),
        }
    }
}

/// Launches the client executable in a new terminal window
#[derive(Debug, Clone)]
pub struct TerminalLauncher {
    program: PathBuf,
    recipe: LaunchRecipe,
}

impl TerminalLauncher {
    pub fn new(program: PathBuf, recipe: LaunchRecipe) -> Self {
        Self { program, recipe }
    }

    /// Launcher for the current platform.
    /// Fails with [`WindowError::PlatformUnsupported`] when no recipe exists.
    pub fn from_config(config: &LauncherConfig) -> Result<Self> {
        let recipe = LaunchRecipe::for_os(std::env::consts::OS, config)?;
        let program = match &config.client_program {
            Some(path) => path.clone(),
            None => default_client_program()?,
        };
        Ok(Self::new(program, recipe))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Full command line for a request, program first
    pub fn command_line(&self, request: &LaunchRequest) -> Vec<String> {
        let mut line = match &self.recipe {
            LaunchRecipe::NewConsole => Vec::new(),
            LaunchRecipe::Emulator(prefix) => prefix.clone(),
        };
        line.push(self.program.to_string_lossy().into_owned());
        line.extend(request.client_args());
        line
    }
}

impl Launcher for TerminalLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<()> {
        let line = self.command_line(request);
        debug!("Launching terminal: {:?}", line);

        match self.recipe {
            LaunchRecipe::NewConsole => spawn_new_console(&line),
            LaunchRecipe::Emulator(_) => spawn_detached(&line),
        }
    }
}

/// Client executable next to the current one
fn default_client_program() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(WindowError::Spawn)?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(format!("{}{}", CLIENT_PROGRAM, std::env::consts::EXE_SUFFIX)))
}

fn spawn_detached(line: &[String]) -> Result<()> {
    let (program, args) = line
        .split_first()
        .ok_or_else(|| WindowError::PlatformUnsupported("empty terminal command".to_string()))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(WindowError::Spawn)?;

    // Reap the emulator process when it exits
    thread::spawn(move || {
        if let Err(e) = child.wait() {
            warn!("Failed to wait for terminal process: {}", e);
        }
    });
    Ok(())
}

/// Start the client in a new console window
#[cfg(windows)]
fn spawn_new_console(line: &[String]) -> Result<()> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows::core::{PCWSTR, PWSTR};
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{
        CreateProcessW, CREATE_NEW_CONSOLE, NORMAL_PRIORITY_CLASS, PROCESS_INFORMATION,
        STARTUPINFOW,
    };

    // Build command line: "exe_path" arg1 arg2 ...
    let (program, args) = line
        .split_first()
        .ok_or_else(|| WindowError::PlatformUnsupported("empty terminal command".to_string()))?;
    let cmd_line = format!("\"{}\" {}", program, args.join(" "));

    let mut cmd_wide: Vec<u16> = OsStr::new(&cmd_line)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    unsafe {
        let mut si: STARTUPINFOW = std::mem::zeroed();
        si.cb = std::mem::size_of::<STARTUPINFOW>() as u32;

        let mut pi: PROCESS_INFORMATION = std::mem::zeroed();

        CreateProcessW(
            PCWSTR::null(),
            PWSTR(cmd_wide.as_mut_ptr()),
            None,
            None,
            false,
            CREATE_NEW_CONSOLE | NORMAL_PRIORITY_CLASS,
            None,
            PCWSTR::null(),
            &si,
            &mut pi,
        )
        .map_err(|e| WindowError::Spawn(std::io::Error::from_raw_os_error(e.code().0)))?;

        // Close handles we don't need
        let _ = CloseHandle(pi.hProcess);
        let _ = CloseHandle(pi.hThread);
    }
    Ok(())
}

#[cfg(not(windows))]
fn spawn_new_console(_line: &[String]) -> Result<()> {
    Err(WindowError::PlatformUnsupported(
        "new console windows are only available on Windows".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LaunchRequest {
        LaunchRequest {
            identifier: WindowId::new(),
            address: "127.0.0.1:40123".parse().unwrap(),
        }
    }

    #[test]
    fn test_platform_recipes() {
        let config = LauncherConfig::default();
        assert_eq!(LaunchRecipe::for_os("windows", &config).unwrap(), LaunchRecipe::NewConsole);
        assert_eq!(
            LaunchRecipe::for_os("linux", &config).unwrap(),
            LaunchRecipe::Emulator(vec!["gnome-terminal".to_string(), "--".to_string()])
        );
        assert!(matches!(
            LaunchRecipe::for_os("plan9", &config),
            Err(WindowError::PlatformUnsupported(os)) if os == "plan9"
        ));
    }

    #[test]
    fn test_configured_terminal_overrides_platform() {
        let config = LauncherConfig {
            client_program: None,
            terminal: Some(vec!["xterm".to_string(), "-e".to_string()]),
        };
        assert_eq!(
            LaunchRecipe::for_os("macos", &config).unwrap(),
            LaunchRecipe::Emulator(vec!["xterm".to_string(), "-e".to_string()])
        );

        let empty = LauncherConfig {
            client_program: None,
            terminal: Some(Vec::new()),
        };
        assert!(LaunchRecipe::for_os("macos", &empty).is_err());
    }

    #[test]
    fn test_command_line() {
        let request = request();
        let launcher = TerminalLauncher::new(
            PathBuf::from("/opt/wt/window-terminal-client"),
            LaunchRecipe::Emulator(vec!["gnome-terminal".to_string(), "--".to_string()]),
        );

        assert_eq!(
            launcher.command_line(&request),
            vec![
                "gnome-terminal".to_string(),
                "--".to_string(),
                "/opt/wt/window-terminal-client".to_string(),
                request.identifier.to_string(),
                "127.0.0.1".to_string(),
                "40123".to_string(),
            ]
        );
    }

    #[test]
    fn test_configured_client_program() {
        let config = LauncherConfig {
            client_program: Some(PathBuf::from("/usr/bin/wt-client")),
            terminal: Some(vec!["xterm".to_string(), "-e".to_string()]),
        };
        let launcher = TerminalLauncher::from_config(&config).unwrap();
        assert_eq!(launcher.program(), Path::new("/usr/bin/wt-client"));
    }

    #[test]
    fn test_missing_emulator_is_spawn_error() {
        let launcher = TerminalLauncher::new(
            PathBuf::from("client"),
            LaunchRecipe::Emulator(vec!["/nonexistent/terminal-emulator".to_string()]),
        );
        assert!(matches!(launcher.launch(&request()), Err(WindowError::Spawn(_))));
    }
}
