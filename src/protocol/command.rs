//! Command vocabulary sent from the host to a terminal, and the input
//! result sent back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec;
use crate::error::ProtocolError;

/// Identifies one logical window. Minted by the host, announced by the
/// terminal as the first bytes of its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(Uuid);

impl WindowId {
    /// Length of the textual form (hyphenated UUID)
    pub const TEXT_LEN: usize = 36;

    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for WindowId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Only the hyphenated form is announced on the wire
        if s.len() != Self::TEXT_LEN {
            return Err(ProtocolError::InvalidIdentifier(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidIdentifier(s.to_string()))
    }
}

/// A command for a terminal window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write the text verbatim to the terminal
    Print(String),
    /// Show the prompt, read one line and send it back
    Input(String),
    /// Stop the terminal's read loop
    Close,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Print(_) => "print",
            Command::Input(_) => "input",
            Command::Close => "close",
        }
    }
}

/// A command addressed to one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub identifier: WindowId,
    pub command: Command,
}

/// JSON shape on the wire
#[derive(Serialize, Deserialize)]
struct WireCommand {
    identifier: String,
    command: String,
    argument: Option<String>,
}

impl CommandMessage {
    pub fn new(identifier: WindowId, command: Command) -> Self {
        Self {
            identifier,
            command,
        }
    }

    /// Serialize and frame for the wire
    pub fn encode(&self) -> Vec<u8> {
        let (command, argument) = match &self.command {
            Command::Print(text) => ("print", Some(text.clone())),
            Command::Input(prompt) => ("input", Some(prompt.clone())),
            Command::Close => ("close", None),
        };
        let wire = WireCommand {
            identifier: self.identifier.to_string(),
            command: command.to_string(),
            argument,
        };
        // Serializing a struct of strings cannot fail
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        codec::encode(&json)
    }

    /// Parse one decoded frame payload
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let wire: WireCommand =
            serde_json::from_slice(payload).map_err(ProtocolError::InvalidJson)?;
        let identifier = wire.identifier.parse()?;
        let command = match wire.command.as_str() {
            "print" => Command::Print(wire.argument.ok_or(ProtocolError::MissingArgument("print"))?),
            "input" => Command::Input(wire.argument.ok_or(ProtocolError::MissingArgument("input"))?),
            "close" => Command::Close,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };
        Ok(Self {
            identifier,
            command,
        })
    }
}

/// Frame an input result (the raw line typed in the terminal)
pub fn encode_input_result(line: &str) -> Vec<u8> {
    codec::encode(line.as_bytes())
}

/// Turn a decoded frame payload back into the typed line
pub fn decode_input_result(payload: Vec<u8>) -> Result<String, ProtocolError> {
    String::from_utf8(payload).map_err(ProtocolError::InvalidUtf8)
}

/// Join values the way `print` does: separator between, terminator after
pub fn format_print<I, T>(values: I, separator: &str, terminator: &str) -> String
where
    I: IntoIterator<Item = T>,
    T: fmt::Display,
{
    let mut text = values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(separator);
    text.push_str(terminator);
    text
}
