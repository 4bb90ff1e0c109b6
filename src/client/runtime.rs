//! Terminal client runtime
//!
//! Runs inside the spawned terminal window: connects back to the host,
//! announces its identifier and executes the commands it receives.
//!
//! The socket loop hands `print` and `input` to a console worker in arrival
//! order, so a prompt is shown and answered before any later print. The loop
//! keeps reading meanwhile, which lets `close` and a lost host end the client
//! even while a prompt is waiting for a line.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::console::Console;
use crate::config::HostConfig;
use crate::error::{is_timeout, Result};
use crate::protocol::command::encode_input_result;
use crate::protocol::{Command, CommandMessage, FrameDecoder, WindowId};

/// How often a finishing client checks on the console worker
const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Why the client stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// Host sent `close`
    Closed,
    /// Host closed or reset the connection
    HostDisconnected,
    /// Local input ended, so prompts can no longer be answered
    ConsoleClosed,
}

/// Client side of one window connection
pub struct TerminalClient {
    id: WindowId,
    stream: TcpStream,
    config: HostConfig,
}

impl TerminalClient {
    /// Connect to the host and announce `id`
    pub fn connect(id: WindowId, address: SocketAddr, config: &HostConfig) -> Result<Self> {
        let mut stream = TcpStream::connect(address)?;
        stream.set_read_timeout(Some(config.poll_interval()))?;
        stream.write_all(id.to_string().as_bytes())?;
        info!("Window {} connected to host {}", id, address);

        Ok(Self {
            id,
            stream,
            config: config.clone(),
        })
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Execute commands until the host closes the window or goes away.
    ///
    /// Malformed frames and unknown commands end the session with an error.
    pub fn run<C: Console>(self, console: C) -> Result<ClientExit> {
        let worker = ConsoleWorker::spawn(console, self.stream.try_clone()?)?;

        let outcome = self.read_loop(&worker);
        if let Ok(ClientExit::Closed | ClientExit::HostDisconnected) = outcome {
            worker.drain();
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        match &outcome {
            Ok(exit) => info!("Window {} client exiting: {:?}", self.id, exit),
            Err(e) => warn!("Window {} client failed: {}", self.id, e),
        }
        outcome
    }

    fn read_loop(&self, worker: &ConsoleWorker) -> Result<ClientExit> {
        let mut decoder = FrameDecoder::new(self.config.max_frame_len);
        let mut buffer = vec![0u8; self.config.read_buffer_size.max(1)];
        let mut stream = &self.stream;

        loop {
            if worker.is_closed() {
                return Ok(ClientExit::ConsoleClosed);
            }

            let n = match stream.read(&mut buffer) {
                Ok(0) if worker.is_closed() => {
                    return Ok(ClientExit::ConsoleClosed)
                }
                Ok(0) => return Ok(ClientExit::HostDisconnected),
                Ok(n) => n,
                Err(e) if is_timeout(&e) || e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    info!("Connection to host lost: {}", e);
                    return Ok(ClientExit::HostDisconnected);
                }
            };

            for payload in decoder.feed(&buffer[..n])? {
                let message = CommandMessage::decode(&payload)?;
                if message.identifier != self.id {
                    warn!(
                        "Ignoring '{}' addressed to window {}",
                        message.command.name(),
                        message.identifier
                    );
                    continue;
                }

                debug!("Window {}: received '{}'", self.id, message.command.name());
                match message.command {
                    Command::Close => return Ok(ClientExit::Closed),
                    command => {
                        if worker.commands.send(command).is_err() {
                            return Ok(ClientExit::ConsoleClosed);
                        }
                    }
                }
            }
        }
    }
}

/// Performs `print` and `input` one at a time, in the order received
struct ConsoleWorker {
    commands: Sender<Command>,
    thread: JoinHandle<()>,
    /// Blocked on a console line
    reading: Arc<AtomicBool>,
    /// Console input ended; the connection has been shut down
    closed: Arc<AtomicBool>,
}

impl ConsoleWorker {
    fn spawn<C: Console>(console: C, mut replies: TcpStream) -> Result<Self> {
        let (commands, rx) = mpsc::channel::<Command>();
        let reading = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        let thread = {
            let reading = reading.clone();
            let closed = closed.clone();
            thread::Builder::new()
                .name("wt-console".to_string())
                .spawn(move || {
                    if !perform_commands(&console, rx, &mut replies, &reading) {
                        // Unanswerable from here on: drop the connection so
                        // the host releases whoever is waiting
                        closed.store(true, Ordering::SeqCst);
                        let _ = replies.shutdown(Shutdown::Both);
                    }
                })?
        };

        Ok(Self {
            commands,
            thread,
            reading,
            closed,
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Let queued commands run before the client exits. Stops early once the
    /// worker waits on a prompt that will never be answered.
    fn drain(self) {
        drop(self.commands);
        while !self.thread.is_finished() {
            if self.reading.load(Ordering::SeqCst) {
                debug!("Leaving pending prompt unanswered");
                return;
            }
            thread::sleep(DRAIN_POLL);
        }
    }
}

/// Run commands until the queue closes. Returns false if console input
/// ended or an answer could not be sent.
fn perform_commands<C: Console>(
    console: &C,
    commands: Receiver<Command>,
    replies: &mut TcpStream,
    reading: &AtomicBool,
) -> bool {
    for command in commands {
        let prompt = match command {
            Command::Print(text) => {
                if let Err(e) = console.write_text(&text) {
                    warn!("Failed to write to console: {}", e);
                }
                continue;
            }
            Command::Input(prompt) => prompt,
            Command::Close => break,
        };

        reading.store(true, Ordering::SeqCst);
        let line = console.read_line(&prompt);
        reading.store(false, Ordering::SeqCst);

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console input closed");
                return false;
            }
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                return false;
            }
        };
        if let Err(e) = replies
            .write_all(&encode_input_result(&line))
            .and_then(|_| replies.flush())
        {
            warn!("Failed to send input result: {}", e);
            return false;
        }
    }
    true
}
