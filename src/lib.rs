//! window-terminal - spawn terminal windows and drive them remotely
//!
//! A host process creates [`Window`]s through an [`IpcHost`]. Each window
//! launches a detached terminal running `window-terminal-client`, which
//! connects back over loopback TCP. The host can then print to the window,
//! ask for a line of input (blocking or with a callback) and close it.
//!
//! # Example
//!
//! ```no_run
//! use window_terminal::{Config, IpcHost};
//!
//! fn main() -> window_terminal::Result<()> {
//!     let host = IpcHost::new(&Config::load())?;
//!
//!     let window = host.create_window()?;
//!     window.open()?;
//!     window.print("Hello from the host!")?;
//!
//!     let name = window.input("What's your name? ")?;
//!     println!("Window replied: {:?}", name);
//!
//!     window.input_with("Anything else? ", |reply| println!("Later: {:?}", reply))?;
//!     window.wait_close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - **protocol**: framing codec and command messages
//! - **host**: `IpcHost`, `Window`, registry and process launcher
//! - **client**: the runtime executed inside each terminal window
//! - **config**: `~/.window-terminal/config.toml`

pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod protocol;

pub use config::Config;
pub use error::{ProtocolError, Result, WindowError};
pub use host::{IpcHost, Window};
pub use protocol::WindowId;
