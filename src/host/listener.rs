//! IpcHost - listener serving every window of one host
//!
//! The listener starts on the first `create_window` and accepts terminal
//! connections on a background thread. Each connection gets its own reader
//! thread, which binds it to a window by the announced identifier and then
//! delivers input results until the connection closes.
//!
//! ```text
//! Stopped --create_window--> Listening --shutdown--> Stopped
//! ```

use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::launcher::{Launcher, TerminalLauncher};
use super::registry::Registry;
use super::window::{Window, WindowShared};
use crate::config::{Config, HostConfig};
use crate::error::{is_timeout, ProtocolError, Result, WindowError};
use crate::protocol::command::decode_input_result;
use crate::protocol::{FrameDecoder, WindowId};

/// First pause between accept attempts once no connection is pending.
/// Doubles while idle, up to the poll interval.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(5);

enum ListenerState {
    Stopped,
    Listening {
        address: SocketAddr,
        shutdown: Arc<AtomicBool>,
        thread: JoinHandle<()>,
    },
}

/// Host side of the window protocol.
///
/// Owns the window registry and the listener; dropping the host shuts the
/// listener down.
pub struct IpcHost {
    config: HostConfig,
    registry: Registry,
    launcher: Arc<dyn Launcher>,
    listener: Mutex<ListenerState>,
}

impl IpcHost {
    /// Host using the platform's terminal launcher.
    /// Fails with [`WindowError::PlatformUnsupported`] if there is none.
    pub fn new(config: &Config) -> Result<Self> {
        let launcher = TerminalLauncher::from_config(&config.launcher)?;
        Ok(Self::with_launcher(config.host.clone(), Arc::new(launcher)))
    }

    pub fn with_launcher(config: HostConfig, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            config,
            registry: Registry::default(),
            launcher,
            listener: Mutex::new(ListenerState::Stopped),
        }
    }

    fn lock_listener(&self) -> MutexGuard<'_, ListenerState> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an unconnected window, starting the listener if needed.
    /// Bind failures are returned here.
    pub fn create_window(&self) -> Result<Window> {
        // Registered under the listener lock so shutdown sees either the
        // window or the fresh listener, never a window bound to a dead one
        let mut state = self.lock_listener();
        let address = self.ensure_listening(&mut state)?;
        let window = Window::new(address, self.launcher.clone());
        self.registry.insert(window.shared().clone());
        debug!("Registered window {}", window.id());
        Ok(window)
    }

    /// Create a window and launch its terminal
    pub fn open_window(&self) -> Result<Window> {
        let window = self.create_window()?;
        window.open()?;
        Ok(window)
    }

    fn ensure_listening(&self, state: &mut ListenerState) -> Result<SocketAddr> {
        if let ListenerState::Listening { address, .. } = state {
            return Ok(*address);
        }

        // The channel carries no authentication
        if !self.config.bind_ip.is_loopback() {
            return Err(WindowError::Bind(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a loopback address", self.config.bind_ip),
            )));
        }

        let listener =
            TcpListener::bind((self.config.bind_ip, 0)).map_err(WindowError::Bind)?;
        listener.set_nonblocking(true).map_err(WindowError::Bind)?;
        let address = listener.local_addr().map_err(WindowError::Bind)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let acceptor = Acceptor {
            listener,
            registry: self.registry.clone(),
            config: self.config.clone(),
            shutdown: shutdown.clone(),
        };
        let thread = thread::Builder::new()
            .name("wt-accept".to_string())
            .spawn(move || acceptor.run())
            .map_err(WindowError::Bind)?;

        info!("Listening for terminals on {}", address);
        *state = ListenerState::Listening {
            address,
            shutdown,
            thread,
        };
        Ok(address)
    }

    /// Listener address, if listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lock_listener() {
            ListenerState::Listening { address, .. } => Some(*address),
            ListenerState::Stopped => None,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.local_addr().is_some()
    }

    /// Number of windows currently registered
    pub fn window_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_registered(&self, id: WindowId) -> bool {
        self.registry.contains(id)
    }

    /// Stop accepting and ask every connection to wind down.
    ///
    /// Connection threads notice within one poll interval and finish their
    /// windows. Windows that never connected are finished immediately. A
    /// later `create_window` starts a fresh listener.
    pub fn shutdown(&self) {
        // Held until the unattached windows are finished; a concurrent
        // create_window waits and then starts a fresh listener
        let mut state = self.lock_listener();
        let previous = std::mem::replace(&mut *state, ListenerState::Stopped);
        let ListenerState::Listening {
            address,
            shutdown,
            thread,
        } = previous
        else {
            return;
        };

        shutdown.store(true, Ordering::SeqCst);
        if thread.join().is_err() {
            error!("Accept thread for {} panicked", address);
        }

        for window in self.registry.take_unattached() {
            window.finish();
        }
        info!("Listener on {} stopped", address);
    }
}

impl Drop for IpcHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Accept loop state, owned by the accept thread
struct Acceptor {
    listener: TcpListener,
    registry: Registry,
    config: HostConfig,
    shutdown: Arc<AtomicBool>,
}

impl Acceptor {
    fn run(self) {
        let idle_limit = self.config.poll_interval().max(ACCEPT_BACKOFF);
        let mut backoff = ACCEPT_BACKOFF;
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.spawn_connection(stream, peer);
                    backoff = ACCEPT_BACKOFF;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(backoff);
                    backoff = next_backoff(backoff, idle_limit);
                }
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    thread::sleep(self.config.poll_interval());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        debug!("Accepted connection from {}", peer);
        let connection = Connection {
            stream,
            peer,
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            decoder: FrameDecoder::new(self.config.max_frame_len),
            buffer: vec![0u8; self.config.read_buffer_size.max(1)],
            poll_interval: self.config.poll_interval(),
        };
        let spawned = thread::Builder::new()
            .name(format!("wt-conn-{}", peer.port()))
            .spawn(move || connection.serve());
        if let Err(e) = spawned {
            warn!("Failed to spawn reader for {}: {}", peer, e);
        }
    }
}

/// Double the idle pause, capped at `limit`
fn next_backoff(current: Duration, limit: Duration) -> Duration {
    current.saturating_mul(2).min(limit)
}

/// Why a connection's read loop stopped
enum ReadEnd {
    /// Peer closed the stream
    Closed,
    /// Host is shutting down
    Shutdown,
}

/// One terminal connection, owned by its reader thread
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    registry: Registry,
    shutdown: Arc<AtomicBool>,
    decoder: FrameDecoder,
    buffer: Vec<u8>,
    poll_interval: Duration,
}

impl Connection {
    fn serve(mut self) {
        // Accepted sockets may inherit non-blocking mode from the listener
        let setup = self
            .stream
            .set_nonblocking(false)
            .and_then(|_| self.stream.set_read_timeout(Some(self.poll_interval)));
        if let Err(e) = setup {
            warn!("Failed to configure connection from {}: {}", self.peer, e);
            return;
        }

        let (id, leftover) = match self.read_announcement() {
            Ok(Some(announcement)) => announcement,
            Ok(None) => {
                debug!("Connection from {} ended before announcing", self.peer);
                return;
            }
            Err(e) => {
                warn!("Dropping connection from {}: {}", self.peer, e);
                return;
            }
        };

        let Some(window) = self.registry.get(id) else {
            warn!(
                "Dropping connection from {}: {}",
                self.peer,
                WindowError::UnknownIdentifier(id.to_string())
            );
            return;
        };

        let writer = match self.stream.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                warn!("Failed to clone connection for window {}: {}", id, e);
                return;
            }
        };
        if !window.attach(writer) {
            warn!(
                "Dropping connection from {}: window {} is already connected or finished",
                self.peer, id
            );
            return;
        }
        info!("Window {} connected from {}", id, self.peer);

        match self.pump(&window, &leftover) {
            Ok(ReadEnd::Closed) => info!("Window {} disconnected", id),
            Ok(ReadEnd::Shutdown) => debug!("Window {} released by host shutdown", id),
            Err(e) => warn!("Window {} connection lost: {}", id, e),
        }

        // Unregister before finishing so waiters never observe a stale entry
        self.registry.remove(id);
        window.finish();
    }

    /// Read one chunk, treating poll timeouts as "nothing yet".
    /// Returns Ok(None) on timeout.
    fn read_chunk(&mut self) -> Result<Option<usize>> {
        match self.stream.read(&mut self.buffer) {
            Ok(n) => Ok(Some(n)),
            Err(e) if is_timeout(&e) || e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Collect the identifier the terminal announces first.
    /// Bytes past the identifier are returned for the frame decoder.
    fn read_announcement(&mut self) -> Result<Option<(WindowId, Vec<u8>)>> {
        let mut received = Vec::with_capacity(WindowId::TEXT_LEN);
        while received.len() < WindowId::TEXT_LEN {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(None);
            }
            match self.read_chunk()? {
                Some(0) => return Ok(None),
                Some(n) => received.extend_from_slice(&self.buffer[..n]),
                None => continue,
            }
        }

        let leftover = received.split_off(WindowId::TEXT_LEN);
        let text = String::from_utf8(received).map_err(ProtocolError::InvalidUtf8)?;
        let id: WindowId = text.parse()?;
        Ok(Some((id, leftover)))
    }

    /// Deliver input results to the window until the stream ends
    fn pump(&mut self, window: &WindowShared, leftover: &[u8]) -> Result<ReadEnd> {
        self.deliver(window, leftover)?;
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(ReadEnd::Shutdown);
            }
            match self.read_chunk()? {
                Some(0) => return Ok(ReadEnd::Closed),
                Some(n) => {
                    let chunk = self.buffer[..n].to_vec();
                    self.deliver(window, &chunk)?;
                }
                None => continue,
            }
        }
    }

    fn deliver(&mut self, window: &WindowShared, bytes: &[u8]) -> Result<()> {
        for payload in self.decoder.feed(bytes)? {
            let line = decode_input_result(payload)?;
            debug!("Window {}: input result ({} bytes)", window.id(), line.len());
            window.deliver_input(line);
        }
        Ok(())
    }
}
