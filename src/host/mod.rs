//! Host side: windows, the registry and the listener.
//!
//! - **listener**: `IpcHost`, the accept loop and per-connection readers
//! - **window**: `Window`, the handle used to drive one terminal
//! - **registry**: identifier to window map shared with connection threads
//! - **launcher**: spawning the terminal process for a window
//!
//! # Architecture
//!
//! ```text
//! IpcHost
//! ├── Registry (WindowId -> WindowShared)
//! ├── accept thread
//! │   └── connection thread per terminal
//! └── Launcher
//! Window (user handle, clonable)
//! └── WindowShared (send-gate, input slot, callbacks)
//! ```

pub mod launcher;
pub mod listener;
mod registry;
pub mod window;

pub use launcher::{LaunchRecipe, LaunchRequest, Launcher, TerminalLauncher};
pub use listener::IpcHost;
pub use window::{InputCallback, Window};

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::launcher::{LaunchRequest, Launcher};
    use crate::error::Result;
    use crate::protocol::{CommandMessage, FrameDecoder};

    /// Launcher that only records what it was asked to start
    #[derive(Default)]
    pub(crate) struct RecordingLauncher {
        requests: Mutex<Vec<LaunchRequest>>,
    }

    impl RecordingLauncher {
        pub(crate) fn requests(&self) -> Vec<LaunchRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, request: &LaunchRequest) -> Result<()> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    /// Connected loopback pair: (host side, terminal side)
    pub(crate) fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let terminal = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (host, _) = listener.accept().unwrap();
        terminal.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        (host, terminal)
    }

    /// Read exactly `count` commands from the terminal side of a connection
    pub(crate) fn read_commands(stream: &mut TcpStream, count: usize) -> Vec<CommandMessage> {
        let mut decoder = FrameDecoder::default();
        let mut commands = Vec::new();
        let mut buf = [0u8; 4096];
        while commands.len() < count {
            let n = stream.read(&mut buf).expect("terminal read timed out");
            assert!(n > 0, "host closed the connection");
            for payload in decoder.feed(&buf[..n]).unwrap() {
                commands.push(CommandMessage::decode(&payload).unwrap());
            }
        }
        assert_eq!(commands.len(), count, "more commands than expected");
        commands
    }
}
