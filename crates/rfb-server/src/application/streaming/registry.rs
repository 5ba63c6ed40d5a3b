//! Client IP → streaming session map.
//!
//! # Locking
//!
//! The registry has its own mutex and never holds it while taking the
//! configuration lock: every operation copies a [`StreamingSettings`]
//! snapshot first.  The configured start delay is slept *before* the
//! registry lock is taken, so a slow start does not block other clients.
//!
//! A plain [`stop_all`](StreamingRegistry::stop_all) issued while another
//! thread sleeps in [`start`](StreamingRegistry::start) can be followed by
//! that start inserting a new session.  [`close`](StreamingRegistry::close),
//! which shutdown uses, also marks the registry closed; every start checks
//! that flag under the registry lock and gives up, so nothing is launched
//! after `close` returns.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;
use rfb_core::config::{ServerConfig, StreamingSettings};
use rfb_core::events::{ConfigListener, ListenerError};
use tracing::{debug, error, info, warn};

use super::command::{build_command_line, CaptureBackend};
use super::session::{SessionMap, StreamingSession};
use super::{AddressResolver, ProcessLauncher};

/// Guarantees at most one live streaming process per client IP.
pub struct StreamingRegistry {
    sessions: Arc<SessionMap>,
    config: RwLock<Arc<ServerConfig>>,
    launcher: Arc<dyn ProcessLauncher>,
    resolver: Arc<dyn AddressResolver>,
    backend: CaptureBackend,
    closed: AtomicBool,
}

impl StreamingRegistry {
    pub fn new(
        config: Arc<ServerConfig>,
        launcher: Arc<dyn ProcessLauncher>,
        resolver: Arc<dyn AddressResolver>,
    ) -> Self {
        Self {
            sessions: Arc::default(),
            config: RwLock::new(config),
            launcher,
            resolver,
            backend: CaptureBackend::native(),
            closed: AtomicBool::new(false),
        }
    }

    /// Overrides the platform screen grabber.
    pub fn with_backend(mut self, backend: CaptureBackend) -> Self {
        self.backend = backend;
        self
    }

    /// The configuration this registry currently reads settings from.
    pub fn config(&self) -> Arc<ServerConfig> {
        Arc::clone(&*self.config.read())
    }

    fn settings(&self) -> StreamingSettings {
        self.config.read().streaming_settings()
    }

    // ── Start ─────────────────────────────────────────────────────────────────

    /// Starts streaming to `host`, replacing any session for the same IP.
    ///
    /// Returns `None` when streaming is disabled, the host cannot be
    /// resolved, or the process fails to launch.  None of these leave an
    /// entry behind.
    pub fn start(&self, host: &str) -> Option<Arc<StreamingSession>> {
        let settings = self.settings();
        if !settings.enabled {
            debug!("streaming disabled; not starting a session for {host}");
            return None;
        }

        let ip = match self.resolver.resolve(host) {
            Ok(ip) => ip,
            Err(e) => {
                error!("cannot start streaming: {e}");
                return None;
            }
        };

        self.start_at(ip, settings)
    }

    /// [`start`](Self::start) for an already-numeric peer address, as taken
    /// from an accepted socket.  The peer's port is ignored.
    pub fn start_for_peer(&self, peer: SocketAddr) -> Option<Arc<StreamingSession>> {
        let settings = self.settings();
        if !settings.enabled {
            debug!("streaming disabled; not starting a session for {peer}");
            return None;
        }
        self.start_at(peer.ip(), settings)
    }

    fn start_at(&self, ip: IpAddr, settings: StreamingSettings) -> Option<Arc<StreamingSession>> {
        if self.is_closed() {
            debug!("streaming registry closed; not starting a session for {ip}");
            return None;
        }

        if settings.start_delay_ms > 0 {
            debug!(delay_ms = settings.start_delay_ms, "delaying stream start for {ip}");
            thread::sleep(Duration::from_millis(u64::from(settings.start_delay_ms)));
        }

        let destination = SocketAddr::new(ip, settings.destination_port());
        let command_line = build_command_line(&settings, destination, self.backend);

        let mut map = self.sessions.lock();

        if self.is_closed() {
            info!("server shut down during start delay; not starting a session for {ip}");
            return None;
        }

        if let Some(existing) = map.get(&ip).cloned() {
            info!("replacing existing streaming session for {ip}");
            existing.stop_locked(&mut map);
        }

        let session = Arc::new(StreamingSession::new(
            destination,
            command_line,
            Arc::downgrade(&self.sessions),
        ));

        match self
            .launcher
            .launch(session.command_line(), settings.log_process_output)
        {
            Ok(process) => session.mark_running(process),
            Err(e) => {
                error!(address = %destination, "failed to launch streaming process: {e}");
                return None;
            }
        }

        map.insert(ip, Arc::clone(&session));
        info!(address = %destination, "streaming session started");
        Some(session)
    }

    // ── Stop ──────────────────────────────────────────────────────────────────

    /// Stops the session for `host`.  An unknown host is logged and ignored.
    pub fn stop(&self, host: &str) {
        let ip = match self.resolver.resolve(host) {
            Ok(ip) => ip,
            Err(e) => {
                error!("cannot stop streaming: {e}");
                return;
            }
        };
        self.stop_ip(ip);
    }

    /// Stops the session for `ip`, if any.
    pub fn stop_ip(&self, ip: IpAddr) {
        let session = self.sessions.lock().get(&ip).cloned();
        match session {
            Some(session) => session.stop(),
            None => error!("no streaming session found for {ip}"),
        }
    }

    /// Stops every session.  The registry is empty afterwards.
    pub fn stop_all(&self) {
        let mut map = self.sessions.lock();
        let sessions: Vec<Arc<StreamingSession>> = map.values().cloned().collect();
        for session in &sessions {
            session.stop_locked(&mut map);
        }
        map.clear();

        if !sessions.is_empty() {
            info!("stopped {} streaming session(s)", sessions.len());
        }
    }

    /// Stops every session and refuses all later starts.
    ///
    /// Starts already past their delay finish before this returns; starts
    /// still sleeping return `None` without launching.
    pub fn close(&self) {
        {
            let _map = self.sessions.lock();
            self.closed.store(true, Ordering::SeqCst);
        }
        self.stop_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drops sessions whose process exited on its own.  Returns how many.
    pub fn reap_exited(&self) -> usize {
        let mut map = self.sessions.lock();
        let exited: Vec<Arc<StreamingSession>> =
            map.values().filter(|s| !s.is_running()).cloned().collect();
        for session in &exited {
            warn!(address = %session.address(), "streaming process exited");
            session.stop_locked(&mut map);
        }
        exited.len()
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    /// Session currently registered for `host`, if any.
    pub fn get(&self, host: &str) -> Option<Arc<StreamingSession>> {
        let ip = self.resolver.resolve(host).ok()?;
        self.get_ip(ip)
    }

    pub fn get_ip(&self, ip: IpAddr) -> Option<Arc<StreamingSession>> {
        self.sessions.lock().get(&ip).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Client IPs with a registered session, in no particular order.
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.sessions.lock().keys().copied().collect()
    }
}

impl ConfigListener for StreamingRegistry {
    fn name(&self) -> &str {
        "streaming-registry"
    }

    fn on_config_reload(&self, config: &Arc<ServerConfig>) -> Result<(), ListenerError> {
        *self.config.write() = Arc::clone(config);
        debug!("streaming registry picked up reloaded configuration");
        Ok(())
    }

    fn on_server_shutdown(&self) -> Result<(), ListenerError> {
        self.close();
        Ok(())
    }
}
