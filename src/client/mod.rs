//! Client side: the runtime inside a spawned terminal window.
//!
//! - **runtime**: `TerminalClient`, connection and command dispatch
//! - **console**: local stdin/stdout behind the `Console` trait

pub mod console;
pub mod runtime;

pub use console::{Console, StdConsole};
pub use runtime::{ClientExit, TerminalClient};
