//! Error types shared by the host and the client runtime.

use std::io;
use thiserror::Error;

/// Failures while decoding a frame or a command.
///
/// Any of these is fatal to the connection it occurred on, never to the
/// listener or to other windows.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Frame is not valid base64: {0}")]
    InvalidBase64(#[source] base64::DecodeError),

    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),

    #[error("Malformed command message: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Command '{0}' requires an argument")]
    MissingArgument(&'static str),

    #[error("Frame exceeds {limit} bytes without a delimiter")]
    FrameTooLarge { limit: usize },

    #[error("Invalid window identifier: {0}")]
    InvalidIdentifier(String),
}

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("Window is finished and cannot be used again")]
    AlreadyFinished,

    #[error("Window has already been opened")]
    AlreadyOpened,

    #[error("No window registered for identifier {0}")]
    UnknownIdentifier(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Connection to the terminal was lost")]
    ConnectionLost,

    #[error("Platform not supported: {0}")]
    PlatformUnsupported(String),

    #[error("Failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    #[error("Failed to spawn terminal process: {0}")]
    Spawn(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, WindowError>;

/// True for the error a socket read returns when its read timeout expires
/// (`WouldBlock` on Unix, `TimedOut` on Windows)
pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
