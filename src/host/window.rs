//! Window - host-side handle for one terminal window
//!
//! A window is created unconnected. Every command waits on the send-gate
//! until the terminal process connects back, so commands issued early are
//! queued rather than lost.

use std::fmt;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::launcher::{LaunchRequest, Launcher};
use crate::error::{Result, WindowError};
use crate::protocol::command::format_print;
use crate::protocol::{Command, CommandMessage, WindowId};

/// Called with the typed line when a non-blocking `input` is answered
pub type InputCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// Write half of a terminal connection. Locked per frame so concurrent
/// senders never interleave bytes.
type Writer = Arc<Mutex<TcpStream>>;

/// Mutable per-window state
#[derive(Default)]
struct WindowState {
    /// Present once the terminal has connected, cleared when finished
    writer: Option<Writer>,
    opened: bool,
    close_requested: bool,
    /// Connection is gone or will never come; the window cannot be reused
    finished: bool,
    /// Pending non-blocking inputs, consumed most recent first
    callbacks: Vec<InputCallback>,
    /// Result for a blocking `input` call
    last_input: Option<String>,
}

/// State shared between the user-facing [`Window`] and the listener
pub(crate) struct WindowShared {
    id: WindowId,
    state: Mutex<WindowState>,
    /// Connection attached, or window finished
    connected: Condvar,
    /// Blocking input answered, or window finished
    input_ready: Condvar,
    /// Window finished
    closed: Condvar,
}

impl WindowShared {
    pub(crate) fn new(id: WindowId) -> Self {
        Self {
            id,
            state: Mutex::new(WindowState::default()),
            connected: Condvar::new(),
            input_ready: Condvar::new(),
            closed: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> WindowId {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the terminal connection and open the send-gate.
    ///
    /// Returns false if the window already has a connection or is finished;
    /// the caller should drop the new connection.
    pub(crate) fn attach(&self, stream: TcpStream) -> bool {
        let mut state = self.lock();
        if state.finished || state.writer.is_some() {
            return false;
        }
        state.writer = Some(Arc::new(Mutex::new(stream)));
        self.connected.notify_all();
        true
    }

    /// Hand an input result to the most recent callback, or to a blocking
    /// `input` call when no callback is queued.
    pub(crate) fn deliver_input(&self, line: String) {
        let mut state = self.lock();
        match state.callbacks.pop() {
            Some(callback) => {
                drop(state);
                callback(line);
            }
            None => {
                state.last_input = Some(line);
                self.input_ready.notify_all();
            }
        }
    }

    /// Mark the window finished and release everyone waiting on it
    pub(crate) fn finish(&self) {
        let callbacks = {
            let mut state = self.lock();
            if state.finished {
                return;
            }
            state.finished = true;
            state.writer = None;
            std::mem::take(&mut state.callbacks)
        };
        if !callbacks.is_empty() {
            debug!("Window {} dropped {} pending input callbacks", self.id, callbacks.len());
        }
        drop(callbacks);

        self.connected.notify_all();
        self.input_ready.notify_all();
        self.closed.notify_all();
        info!("Window {} finished", self.id);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.lock().writer.is_some()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Wait at the send-gate and return the connection.
    ///
    /// `prepare` runs under the state lock once the gate is open, before the
    /// frame is written, so bookkeeping is in place before any reply can
    /// arrive.
    fn acquire_writer(&self, prepare: impl FnOnce(&mut WindowState)) -> Result<Writer> {
        let mut state = self.lock();
        if state.finished || state.close_requested {
            return Err(WindowError::AlreadyFinished);
        }

        state = self
            .connected
            .wait_while(state, |s| s.writer.is_none() && !s.finished)
            .unwrap_or_else(PoisonError::into_inner);

        match state.writer.clone() {
            Some(writer) if !state.close_requested => {
                prepare(&mut *state);
                Ok(writer)
            }
            // Closed by another thread while this one waited
            Some(_) => Err(WindowError::AlreadyFinished),
            None => Err(WindowError::ConnectionLost),
        }
    }

    fn send(&self, command: Command, prepare: impl FnOnce(&mut WindowState)) -> Result<()> {
        let writer = self.acquire_writer(prepare)?;
        let name = command.name();
        let frame = CommandMessage::new(self.id, command).encode();

        let mut stream = writer.lock().unwrap_or_else(PoisonError::into_inner);
        stream
            .write_all(&frame)
            .and_then(|_| stream.flush())
            .map_err(|e| {
                warn!("Window {}: failed to send '{}': {}", self.id, name, e);
                WindowError::ConnectionLost
            })?;
        debug!("Window {}: sent '{}'", self.id, name);
        Ok(())
    }
}

/// Handle for one terminal window.
///
/// Cloning yields another handle to the same window, so a window can be
/// driven from several threads.
#[derive(Clone)]
pub struct Window {
    shared: Arc<WindowShared>,
    /// Host listener the terminal connects back to
    address: SocketAddr,
    launcher: Arc<dyn Launcher>,
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.shared.id)
            .field("address", &self.address)
            .field("connected", &self.is_connected())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Window {
    pub(crate) fn new(address: SocketAddr, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            shared: Arc::new(WindowShared::new(WindowId::new())),
            address,
            launcher,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<WindowShared> {
        &self.shared
    }

    /// Identifier the terminal announces when it connects
    pub fn id(&self) -> WindowId {
        self.shared.id
    }

    /// Address of the host listener this window belongs to
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Spawn the terminal process for this window.
    ///
    /// Returns once the process is launched; it does not wait for the
    /// terminal to connect.
    pub fn open(&self) -> Result<()> {
        {
            let mut state = self.shared.lock();
            if state.finished || state.close_requested {
                return Err(WindowError::AlreadyFinished);
            }
            if state.opened {
                return Err(WindowError::AlreadyOpened);
            }
            state.opened = true;
        }

        let request = LaunchRequest {
            identifier: self.id(),
            address: self.address,
        };
        if let Err(e) = self.launcher.launch(&request) {
            self.shared.lock().opened = false;
            return Err(e);
        }
        info!("Window {} opened", self.id());
        Ok(())
    }

    /// Print one value followed by a newline
    pub fn print(&self, value: impl fmt::Display) -> Result<()> {
        self.print_with([value], " ", "\n")
    }

    /// Print values joined by `separator` and followed by `terminator`.
    ///
    /// The terminal writes the resulting text verbatim.
    pub fn print_with<I, T>(&self, values: I, separator: &str, terminator: &str) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: fmt::Display,
    {
        let text = format_print(values, separator, terminator);
        self.shared.send(Command::Print(text), |_| {})
    }

    /// Prompt in the terminal and block until the line is sent back.
    ///
    /// Only one blocking `input` per window may be outstanding at a time.
    /// Fails with [`WindowError::ConnectionLost`] if the terminal goes away
    /// before answering.
    pub fn input(&self, prompt: impl fmt::Display) -> Result<String> {
        self.shared.send(Command::Input(prompt.to_string()), |state| {
            state.last_input = None;
        })?;

        let mut state = self
            .shared
            .input_ready
            .wait_while(self.shared.lock(), |s| s.last_input.is_none() && !s.finished)
            .unwrap_or_else(PoisonError::into_inner);
        state.last_input.take().ok_or(WindowError::ConnectionLost)
    }

    /// Prompt in the terminal and return immediately.
    ///
    /// `callback` runs on the listener's connection thread when a result
    /// arrives. With several callbacks queued, each result goes to the most
    /// recently queued one. Callbacks still queued when the connection is
    /// lost are dropped without being called.
    pub fn input_with<F>(&self, prompt: impl fmt::Display, callback: F) -> Result<()>
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.shared.send(Command::Input(prompt.to_string()), move |state| {
            state.callbacks.push(Box::new(callback));
        })
    }

    /// Ask the terminal to close. Further commands fail with
    /// [`WindowError::AlreadyFinished`]; use [`Window::wait_close`] to wait
    /// for the terminal to actually go away.
    pub fn close(&self) -> Result<()> {
        self.shared.send(Command::Close, |state| {
            state.close_requested = true;
        })
    }

    /// Block until the terminal connection is gone
    pub fn wait_close(&self) {
        let _state = self
            .shared
            .closed
            .wait_while(self.shared.lock(), |s| !s.finished)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Like [`Window::wait_close`], giving up after `timeout`.
    /// Returns true if the window finished.
    pub fn wait_close_timeout(&self, timeout: Duration) -> bool {
        let (state, _) = self
            .shared
            .closed
            .wait_timeout_while(self.shared.lock(), timeout, |s| !s.finished)
            .unwrap_or_else(PoisonError::into_inner);
        state.finished
    }
}
