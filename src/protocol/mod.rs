//! Wire protocol between the host and its terminal windows.
//!
//! - **codec**: base64 + `\r\n` framing and the per-connection accumulator
//! - **command**: `print` / `input` / `close` commands and input results
//!
//! # Connection Lifecycle
//!
//! ```text
//! terminal                               host
//!    | ---- identifier (36 bytes, raw) ---> |  bind to Window
//!    | <--- frame(json command) ----------- |  print / input / close
//!    | ---- frame(typed line) ------------> |  input result
//! ```

pub mod codec;
pub mod command;

pub use codec::{FrameDecoder, DELIMITER};
pub use command::{Command, CommandMessage, WindowId};
