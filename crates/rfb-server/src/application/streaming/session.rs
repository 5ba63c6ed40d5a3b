//! One external streaming process bound to one client address.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::ProcessHandle;

/// Shared session map owned by the registry.
pub(crate) type SessionMap = Mutex<HashMap<IpAddr, Arc<StreamingSession>>>;

/// Lifecycle of a [`StreamingSession`].  `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Stopped,
}

/// A running broadcast to one client.
///
/// Created by [`StreamingRegistry`](super::StreamingRegistry); holds the
/// owned process handle and a weak back-reference to the registry map so
/// that [`stop`](Self::stop) can remove its own entry.
pub struct StreamingSession {
    address: SocketAddr,
    command_line: String,
    state: Mutex<SessionState>,
    process: Mutex<Option<Box<dyn ProcessHandle>>>,
    sessions: Weak<SessionMap>,
}

impl StreamingSession {
    pub(crate) fn new(address: SocketAddr, command_line: String, sessions: Weak<SessionMap>) -> Self {
        Self {
            address,
            command_line,
            state: Mutex::new(SessionState::Starting),
            process: Mutex::new(None),
            sessions,
        }
    }

    /// Destination `ip:port` of the stream.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn ip(&self) -> IpAddr {
        self.address.ip()
    }

    /// The exact command line the process was started with.
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// OS id of the streaming process, if one was attached.
    pub fn process_id(&self) -> Option<u32> {
        self.process.lock().as_ref().map(|p| p.id())
    }

    /// `true` while the session is `Running` and its process has not exited.
    pub fn is_running(&self) -> bool {
        if self.state() != SessionState::Running {
            return false;
        }
        self.process
            .lock()
            .as_mut()
            .map(|p| p.is_alive())
            .unwrap_or(false)
    }

    /// Attaches the launched process and moves `Starting → Running`.
    pub(crate) fn mark_running(&self, process: Box<dyn ProcessHandle>) {
        debug!(address = %self.address, pid = process.id(), "streaming process attached");
        *self.process.lock() = Some(process);
        *self.state.lock() = SessionState::Running;
    }

    /// Terminates the process and removes this session from the registry.
    ///
    /// Idempotent.  A stale handle never removes a newer session registered
    /// for the same client.
    pub fn stop(&self) {
        match self.sessions.upgrade() {
            Some(sessions) => {
                let mut map = sessions.lock();
                self.stop_locked(&mut map);
            }
            None => self.terminate(),
        }
    }

    /// [`stop`](Self::stop) for callers already holding the registry lock.
    pub(crate) fn stop_locked(&self, map: &mut HashMap<IpAddr, Arc<StreamingSession>>) {
        self.terminate();

        let ip = self.ip();
        if map
            .get(&ip)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), self))
        {
            map.remove(&ip);
            info!(address = %self.address, "streaming session stopped");
        }
    }

    fn terminate(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Stopped {
                return;
            }
            *state = SessionState::Stopped;
        }

        if let Some(mut process) = self.process.lock().take() {
            if process.is_alive() {
                if let Err(e) = process.terminate() {
                    warn!(address = %self.address, "failed to terminate streaming process: {e}");
                }
            }
        }
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("command_line", &self.command_line)
            .finish()
    }
}
